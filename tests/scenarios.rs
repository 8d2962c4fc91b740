//! End-to-end invoice lifecycle scenarios against a real sled database.
mod common;

use anyhow::Context;
use common::{draft, fixture};
use chrono::{TimeDelta, Utc};
use invoice_lifecycle::{
    InvoiceStatus, LifecycleError, TransitionContext,
    effects::{EffectsReport, Materialization},
    invoice::{Invoice, InvoiceAmendment},
    outbox::{EffectKind, MAX_ATTEMPTS, OutboxTask},
    project::{Expense, PENDING_CATEGORY, Project},
    types::{CalendarDate, TimeStamp},
};
use std::sync::Barrier;

#[test]
fn submit_review_approve_and_pay() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(Some("user_luz"))?;
    let project = fx.project("Videoclip Marea")?;

    let invoice = fx.submitted(&provider).context("Invoice failed on submit: ")?;
    assert_eq!(invoice.status, InvoiceStatus::Pending);
    assert_eq!(invoice.radicado_number, 1);

    let invoice = fx
        .console
        .invoices
        .request_transition(&invoice.id, InvoiceStatus::InReview, "producer", TransitionContext::new())
        .context("Invoice failed on review: ")?;
    assert_eq!(invoice.status, InvoiceStatus::InReview);

    let invoice = fx
        .console
        .invoices
        .request_transition(
            &invoice.id,
            InvoiceStatus::Approved,
            "finance",
            TransitionContext::new().with_project(&project.id),
        )
        .context("Invoice failed on approval: ")?;
    assert_eq!(invoice.status, InvoiceStatus::Approved);
    assert!(invoice.expense_id.is_some());

    let paid_on = CalendarDate::new(2024, 3, 1).unwrap();
    let invoice = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Paid,
        "finance",
        TransitionContext::new().with_payment_date(paid_on),
    )?;
    assert_eq!(invoice.status, InvoiceStatus::Paid);
    assert_eq!(invoice.payment_date, Some(paid_on));

    // every queued effect ran
    assert!(fx.console.invoices.effects().pending()?.is_empty());
    Ok(())
}

#[test]
fn radicados_are_sequential_across_providers() -> anyhow::Result<()> {
    let fx = fixture()?;
    let first = fx.validated_provider(None)?;
    let second = fx.validated_provider(None)?;

    let a = fx.submitted(&first)?;
    let b = fx.submitted(&second)?;
    let c = fx.submitted(&first)?;

    assert_eq!(
        [a.radicado_number, b.radicado_number, c.radicado_number],
        [1, 2, 3]
    );
    assert_eq!(fx.console.invoices.invoices_for_provider(&first.id)?.len(), 2);
    Ok(())
}

#[test]
fn roles_without_the_approval_token_are_forbidden() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    for role in ["producer", "coordinator", "provider", "unknown"] {
        let err = fx
            .console
            .invoices
            .request_transition(&invoice.id, InvoiceStatus::Approved, role, TransitionContext::new())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden { .. }), "{role}: {err}");
    }

    let stored = fx.console.invoices.get_invoice(&invoice.id)?;
    assert_eq!(stored.status, InvoiceStatus::Pending);
    assert_eq!(stored.updated_at, invoice.updated_at);
    Ok(())
}

#[test]
fn returning_requires_notes() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    for blank in ["", "   "] {
        let err = fx
            .console
            .invoices
            .request_transition(
                &invoice.id,
                InvoiceStatus::Returned,
                "finance",
                TransitionContext::new().with_notes(blank),
            )
            .unwrap_err();
        match err {
            LifecycleError::InvalidTransition { reason, .. } => {
                assert_eq!(reason, "notes required to return")
            }
            other => panic!("expected InvalidTransition, got {other}"),
        }
    }

    let returned = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Returned,
        "finance",
        TransitionContext::new().with_notes("Falta el RUT del proveedor"),
    )?;
    assert_eq!(returned.status, InvoiceStatus::Returned);
    assert_eq!(returned.admin_notes.as_deref(), Some("Falta el RUT del proveedor"));
    Ok(())
}

#[test]
fn resubmission_reopens_a_returned_invoice() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let other = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    // only returned invoices accept a resubmission
    let err = fx
        .console
        .invoices
        .resubmit_invoice(&invoice.id, &provider.id, InvoiceAmendment::default())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Returned,
        "coordinator",
        TransitionContext::new().with_notes("El valor no coincide con la orden"),
    )?;

    let err = fx
        .console
        .invoices
        .resubmit_invoice(&invoice.id, &other.id, InvoiceAmendment::default())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Forbidden { .. }));

    let amendment = InvoiceAmendment {
        amount: Some(107_100),
        net_value: Some(90_000),
        ..Default::default()
    };
    let resubmitted = fx
        .console
        .invoices
        .resubmit_invoice(&invoice.id, &provider.id, amendment)?;

    assert_eq!(resubmitted.status, InvoiceStatus::Pending);
    assert_eq!(resubmitted.admin_notes, None);
    assert_eq!(resubmitted.radicado_number, invoice.radicado_number);
    assert_eq!(resubmitted.tax_value, Some(17_100));
    assert_eq!(resubmitted.total_with_tax, Some(107_100));
    Ok(())
}

#[test]
fn approval_with_a_project_creates_exactly_one_expense() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let project = fx.project("Documental Sierra")?;
    let invoice = fx.submitted(&provider)?;

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new()
            .with_project(&project.id)
            .with_notes("OK producción"),
    )?;
    let expense_id = approved.expense_id.clone().context("expense id not linked")?;

    let expenses = fx.store.scan::<Expense>(|_| true)?;
    assert_eq!(expenses.len(), 1);
    let expense = &expenses[0];
    assert_eq!(expense.id, expense_id);
    assert_eq!(expense.project_id, project.id);
    assert_eq!(expense.category, PENDING_CATEGORY);
    assert_eq!(expense.amount, 119_000);
    assert_eq!(expense.due_date, CalendarDate::new(2024, 3, 1));
    assert!(expense.observations.contains("Radicado #1"));
    assert!(expense.observations.contains("OK producción"));

    // running the materialization step again is a no-op
    let effects = fx.console.invoices.effects();
    assert_eq!(
        effects.materialize_expense(&invoice.id)?,
        Materialization::AlreadyLinked(expense_id.clone())
    );
    assert_eq!(
        effects.materialize_expense(&invoice.id)?,
        Materialization::AlreadyLinked(expense_id)
    );
    assert_eq!(fx.store.count::<Expense>(), 1);
    Ok(())
}

#[test]
fn approval_without_a_project_creates_no_expense() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "admin",
        TransitionContext::new().with_categoria("alquiler_equipos"),
    )?;

    assert_eq!(approved.expense_id, None);
    assert_eq!(approved.categoria.as_deref(), Some("alquiler_equipos"));
    assert_eq!(fx.store.count::<Expense>(), 0);
    assert!(fx.console.invoices.effects().pending()?.is_empty());
    Ok(())
}

#[test]
fn categoria_and_term_flow_into_the_expense() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let project = fx.project("Serie Web")?;
    let invoice = fx.submitted(&provider)?;

    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new()
            .with_project(&project.id)
            .with_categoria("talento")
            .with_payment_term_days(30),
    )?;

    let expense = fx.store.scan::<Expense>(|_| true)?.remove(0);
    assert_eq!(expense.category, "talento");
    assert_eq!(expense.due_date, CalendarDate::new(2024, 1, 31));
    Ok(())
}

#[test]
fn paid_without_a_date_defaults_to_today() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new(),
    )?;
    let paid = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Paid,
        "finance",
        TransitionContext::new(),
    )?;

    assert_eq!(paid.payment_date, Some(CalendarDate::today()));
    Ok(())
}

#[test]
fn skipping_and_reopening_are_rejected() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let invoices = &fx.console.invoices;

    let err = invoices
        .request_transition(&invoice.id, InvoiceStatus::Paid, "admin", TransitionContext::new())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

    invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Rejected,
        "admin",
        TransitionContext::new().with_notes("Duplicada"),
    )?;
    for target in [InvoiceStatus::InReview, InvoiceStatus::Approved, InvoiceStatus::Pending] {
        let err = invoices
            .request_transition(&invoice.id, target, "admin", TransitionContext::new())
            .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }), "{target}");
    }
    assert_eq!(invoices.get_invoice(&invoice.id)?.status, InvoiceStatus::Rejected);
    Ok(())
}

#[test]
fn unknown_invoice_and_project_are_not_found() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    let err = fx
        .console
        .invoices
        .request_transition("inv_missing", InvoiceStatus::InReview, "admin", TransitionContext::new())
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { entity: "invoice", .. }));

    let err = fx
        .console
        .invoices
        .request_transition(
            &invoice.id,
            InvoiceStatus::Approved,
            "admin",
            TransitionContext::new().with_project("proj_missing"),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::NotFound { entity: "project", .. }));
    Ok(())
}

#[test]
fn stale_etag_is_a_conflict() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let seen = invoice.etag()?;

    // another administrator moves the invoice first
    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::InReview,
        "producer",
        TransitionContext::new(),
    )?;

    let err = fx
        .console
        .invoices
        .request_transition(
            &invoice.id,
            InvoiceStatus::Approved,
            "finance",
            TransitionContext::new().expecting_etag(&seen),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::Conflict { .. }));

    let fresh = fx.console.invoices.get_invoice(&invoice.id)?.etag()?;
    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new().expecting_etag(&fresh),
    )?;
    assert_eq!(approved.status, InvoiceStatus::Approved);
    Ok(())
}

#[test]
fn project_is_fixed_once_an_expense_exists() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let first = fx.project("Uno")?;
    let second = fx.project("Dos")?;
    let invoice = fx.submitted(&provider)?;

    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new().with_project(&first.id),
    )?;
    let err = fx
        .console
        .invoices
        .request_transition(
            &invoice.id,
            InvoiceStatus::Paid,
            "finance",
            TransitionContext::new().with_project(&second.id),
        )
        .unwrap_err();

    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    Ok(())
}

#[test]
fn provider_without_user_gets_email_only() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let emails_before = fx.notifier.email_count();

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new(),
    )?;

    assert_eq!(approved.status, InvoiceStatus::Approved);
    assert_eq!(fx.notifier.email_count(), emails_before + 1);
    assert_eq!(fx.notifier.in_app_count(), 0);

    let email = fx.notifier.emails.lock().unwrap().last().cloned().unwrap();
    assert_eq!(email.provider_id, provider.id);
    assert_eq!(email.recipient.as_deref(), Some("cuentas@luz.co"));
    assert_eq!(email.meta.reference.as_deref(), Some("1"));
    assert!(email.body.contains("Aprobada"));
    Ok(())
}

#[test]
fn linked_user_receives_in_app_notification() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(Some("user_42"))?;
    let invoice = fx.submitted(&provider)?;
    let in_app_before = fx.notifier.in_app_count();

    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Returned,
        "finance",
        TransitionContext::new().with_notes("Corregir fecha de emisión"),
    )?;

    let calls = fx.notifier.in_app.lock().unwrap().clone();
    assert_eq!(calls.len(), in_app_before + 1);
    let call = calls.last().unwrap();
    assert_eq!(call.user_id, "user_42");
    assert!(call.message.contains("Corregir fecha de emisión"));
    assert_eq!(call.meta.status, "returned");
    Ok(())
}

#[test]
fn notification_failure_does_not_fail_the_transition() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(Some("user_7"))?;
    let project = fx.project("Festival")?;
    let invoice = fx.submitted(&provider)?;
    fx.notifier.set_failing(true, true);

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new().with_project(&project.id),
    )?;

    // the expense is independent of the notification failures
    assert_eq!(approved.status, InvoiceStatus::Approved);
    assert!(approved.expense_id.is_some());

    let pending = fx.console.invoices.effects().pending()?;
    let mut kinds: Vec<EffectKind> = pending.iter().map(|t| t.kind).collect();
    kinds.sort_by_key(|k| k.as_str());
    assert_eq!(kinds, vec![EffectKind::NotifyEmail, EffectKind::NotifyInApp]);
    assert!(pending.iter().all(|t| t.attempts == 1 && t.last_error.is_some()));

    // relay recovers, the reconciliation pass delivers what was owed
    fx.notifier.set_failing(false, false);
    let report = fx.console.invoices.effects().drain_pending()?;
    assert!(report.is_clean());
    assert_eq!(report.completed.len(), 2);
    assert!(fx.console.invoices.effects().pending()?.is_empty());
    Ok(())
}

#[test]
fn failed_materialization_is_retried_by_the_outbox() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;

    // an imported row pointing at a project that has not been synced yet
    let mut invoice: Invoice = draft(&provider.id)
        .validate_and_finalise("inv_imported".into(), 900, 60)?;
    invoice.status = InvoiceStatus::InReview;
    invoice.project_id = Some("proj_late".into());
    fx.store.insert(&invoice)?;

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new(),
    )?;
    assert_eq!(approved.status, InvoiceStatus::Approved);
    assert_eq!(approved.expense_id, None);

    let pending: Vec<OutboxTask> = fx.console.invoices.effects().pending()?;
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].kind, EffectKind::MaterializeExpense);

    fx.store.insert(&Project::new("proj_late".into(), "Tardío", None))?;

    let report = fx.console.invoices.effects().drain_pending()?;
    assert!(report.is_clean());
    let linked = fx.console.invoices.get_invoice(&invoice.id)?;
    assert!(linked.expense_id.is_some());
    assert_eq!(fx.store.count::<Expense>(), 1);
    Ok(())
}

#[test]
fn project_cannot_move_while_its_expense_is_queued() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let other = fx.project("Otro")?;

    let mut invoice: Invoice = draft(&provider.id)
        .validate_and_finalise("inv_queued".into(), 901, 60)?;
    invoice.status = InvoiceStatus::InReview;
    invoice.project_id = Some("proj_late".into());
    fx.store.insert(&invoice)?;

    let approved = fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::Approved,
        "finance",
        TransitionContext::new(),
    )?;
    assert_eq!(approved.expense_id, None);

    let err = fx
        .console
        .invoices
        .request_transition(
            &invoice.id,
            InvoiceStatus::Paid,
            "finance",
            TransitionContext::new().with_project(&other.id),
        )
        .unwrap_err();
    assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    let stored = fx.console.invoices.get_invoice(&invoice.id)?;
    assert_eq!(stored.status, InvoiceStatus::Approved);
    assert_eq!(stored.project_id.as_deref(), Some("proj_late"));

    fx.store.insert(&Project::new("proj_late".into(), "Tardío", None))?;
    fx.console.invoices.effects().drain_pending()?;

    let expenses = fx.store.scan::<Expense>(|_| true)?;
    assert_eq!(expenses.len(), 1);
    assert_eq!(expenses[0].project_id, "proj_late");
    Ok(())
}

#[test]
fn overlapping_runs_deliver_a_queued_email_once() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;

    fx.notifier.set_failing(true, false);
    fx.console.invoices.request_transition(
        &invoice.id,
        InvoiceStatus::InReview,
        "admin",
        TransitionContext::new(),
    )?;
    fx.notifier.set_failing(false, false);
    assert_eq!(fx.console.invoices.effects().pending()?.len(), 1);
    let emails_before = fx.notifier.email_count();

    let barrier = &Barrier::new(2);
    let effects = fx.console.invoices.effects();
    let invoice_id = invoice.id.as_str();
    let reports: Vec<EffectsReport> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                s.spawn(move || {
                    barrier.wait();
                    effects.run_for_invoice(invoice_id)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(fx.notifier.email_count(), emails_before + 1);
    assert_eq!(reports.iter().map(|r| r.completed.len()).sum::<usize>(), 1);
    assert!(reports.iter().all(EffectsReport::is_clean));
    assert!(fx.console.invoices.effects().pending()?.is_empty());
    Ok(())
}

#[test]
fn live_claims_are_skipped_and_stale_ones_reclaimed() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let emails_before = fx.notifier.email_count();

    let mut task = OutboxTask::new(
        "job_held".into(),
        &invoice.id,
        EffectKind::NotifyEmail,
        InvoiceStatus::InReview,
    );
    task.claimed_at = Some(TimeStamp::now());
    fx.store.insert(&task)?;

    let report = fx.console.invoices.effects().drain_pending()?;
    assert_eq!(report.in_flight, 1);
    assert!(report.completed.is_empty());
    assert_eq!(fx.notifier.email_count(), emails_before);
    assert_eq!(fx.console.invoices.effects().pending()?.len(), 1);

    // the worker holding it died an hour ago
    task.claimed_at = Some(TimeStamp::from(Utc::now() - TimeDelta::hours(1)));
    fx.store.insert(&task)?;

    let report = fx.console.invoices.effects().drain_pending()?;
    assert_eq!(report.completed, vec![(invoice.id.clone(), EffectKind::NotifyEmail)]);
    assert_eq!(fx.notifier.email_count(), emails_before + 1);
    assert!(fx.console.invoices.effects().pending()?.is_empty());
    Ok(())
}

#[test]
fn tasks_out_of_attempts_are_parked() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let emails_before = fx.notifier.email_count();

    let mut task = OutboxTask::new(
        "job_tired".into(),
        &invoice.id,
        EffectKind::NotifyEmail,
        InvoiceStatus::InReview,
    );
    task.attempts = MAX_ATTEMPTS - 1;
    fx.store.insert(&task)?;

    fx.notifier.set_failing(true, false);
    let report = fx.console.invoices.effects().drain_pending()?;
    assert_eq!(report.failed.len(), 1);
    let pending = fx.console.invoices.effects().pending()?;
    assert_eq!(pending[0].attempts, MAX_ATTEMPTS);
    assert_eq!(pending[0].claimed_at, None);

    // even with the relay back, a parked task is not retried
    fx.notifier.set_failing(false, false);
    let report = fx.console.invoices.effects().drain_pending()?;
    assert!(!report.is_clean());
    assert!(report.completed.is_empty());
    assert_eq!(report.parked.len(), 1);
    assert_eq!(report.parked[0].error, "mail relay rejected the message: smtp relay timed out");
    assert_eq!(fx.notifier.email_count(), emails_before);
    assert_eq!(fx.console.invoices.effects().pending()?.len(), 1);
    Ok(())
}

#[test]
fn invoices_can_be_listed_by_project() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let project = fx.project("Podcast")?;
    let a = fx.submitted(&provider)?;
    let b = fx.submitted(&provider)?;

    for id in [&a.id, &b.id] {
        fx.console.invoices.request_transition(
            id,
            InvoiceStatus::InReview,
            "admin",
            TransitionContext::new().with_project(&project.id),
        )?;
    }

    let listed = fx.console.invoices.invoices_for_project(&project.id)?;
    assert_eq!(listed.iter().map(|i| i.radicado_number).collect::<Vec<_>>(), vec![1, 2]);
    Ok(())
}

#[test]
fn allowed_targets_follow_role_and_status() -> anyhow::Result<()> {
    let fx = fixture()?;
    let provider = fx.validated_provider(None)?;
    let invoice = fx.submitted(&provider)?;
    let invoices = &fx.console.invoices;

    assert_eq!(
        invoices.allowed_targets(&invoice.id, "finance")?,
        vec![
            InvoiceStatus::InReview,
            InvoiceStatus::Approved,
            InvoiceStatus::Returned,
            InvoiceStatus::Rejected
        ]
    );
    assert_eq!(
        invoices.allowed_targets(&invoice.id, "coordinator")?,
        vec![InvoiceStatus::InReview, InvoiceStatus::Returned]
    );
    assert!(invoices.allowed_targets(&invoice.id, "provider")?.is_empty());

    invoices.request_transition(&invoice.id, InvoiceStatus::Approved, "finance", TransitionContext::new())?;
    assert_eq!(invoices.allowed_targets(&invoice.id, "admin")?, vec![InvoiceStatus::Paid]);
    assert!(invoices.allowed_targets(&invoice.id, "producer")?.is_empty());
    Ok(())
}
