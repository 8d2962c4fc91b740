//! Walks one invoice from portal submission to payment, then deletes its project.
use anyhow::Context;
use invoice_lifecycle::{
    Console, InvoiceStatus, TransitionContext,
    invoice::{InvoiceDraft, InvoiceType},
    project::{Project, Sale, Task},
    provider::OnboardingStatus,
    settings::ConsoleConfig,
    telemetry,
    types::CalendarDate,
    utils,
};

fn main() -> anyhow::Result<()> {
    let mut config = ConsoleConfig::load().context("loading console configuration")?;
    telemetry::init_tracing(&config.logging).context("installing tracing subscriber")?;

    // keep the demo away from any real data directory
    let temp_dir = tempfile::tempdir()?;
    config.storage.path = temp_dir.path().join("demo.sled");
    let console = Console::open(&config)?;

    let provider = console.providers.register_provider(
        "Estudio Sonido Norte SAS",
        Some("facturacion@sonidonorte.co"),
        None,
    )?;
    console.providers.request_onboarding_transition(
        &provider.id,
        OnboardingStatus::Validated,
        "coordinator",
        None,
    )?;

    let project = Project::new(utils::new_id(utils::PROJECT_HRP)?, "Comercial Café Andino", Some("Andino"));
    console.store.insert(&project)?;
    console.store.insert(&Sale::new(utils::new_id(utils::RECORD_HRP)?, &project.id, "Pauta TV", 42_000_000))?;
    console.store.insert(&Task::new(utils::new_id(utils::RECORD_HRP)?, &project.id, "Mezcla final"))?;

    let draft = InvoiceDraft::new()
        .set_provider(&provider.id)
        .set_invoice_type(InvoiceType::FormalInvoice)
        .set_invoice_number("SN-2031")
        .set_description("Mezcla y masterización spot 30s")
        .set_amount(5_950_000)
        .set_net_value(5_000_000)
        .set_tax_percentage(19.0)
        .set_issue_date(CalendarDate::today());
    let invoice = console.invoices.submit_invoice(draft)?;
    println!("radicado #{} filed as {}", invoice.radicado_number, invoice.status);

    let invoice = console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::InReview,
        "producer",
        TransitionContext::new(),
    )?;
    let invoice = console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new()
            .with_project(&project.id)
            .with_categoria("postproduccion")
            .expecting_etag(&invoice.etag()?),
    )?;
    println!("approved, expense {:?}", invoice.expense_id);

    let invoice = console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Paid,
        "finance",
        TransitionContext::new(),
    )?;
    println!("paid on {:?}", invoice.payment_date.map(|d| d.to_string()));

    let report = console.projects.delete_project(&project.id)?;
    println!("project deleted: {:?}", report.removed);

    Ok(())
}
