//! Notification sink adapters.
//!
//! The mailer integration lives outside this repository; the logging
//! sink records every trigger with enough context for operators to act
//! on.

use async_trait::async_trait;
use tracing::{error, info};

use labops_server_domain::clients::{ClientResult, Notifier};
use labops_server_domain::shared_kernel::WorkOrderId;

/// Notifier writing structured log lines instead of sending mail.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn work_order_dispatched(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()> {
        info!(
            work_order_id = %work_order_id,
            owner = owner_email,
            "📧 Notification: work order dispatched"
        );
        Ok(())
    }

    async fn work_order_dispatch_failed(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
        errors: &[String],
    ) -> ClientResult<()> {
        error!(
            work_order_id = %work_order_id,
            owner = owner_email,
            errors = %errors.join("; "),
            "📧 Notification: work order dispatch failed"
        );
        Ok(())
    }

    async fn work_order_concluded(
        &self,
        work_order_id: WorkOrderId,
        owner_email: &str,
    ) -> ClientResult<()> {
        info!(
            work_order_id = %work_order_id,
            owner = owner_email,
            "📧 Notification: work order concluded"
        );
        Ok(())
    }

    async fn developer_alert(
        &self,
        work_order_id: WorkOrderId,
        context: &str,
        detail: &str,
    ) -> ClientResult<()> {
        error!(
            work_order_id = %work_order_id,
            context = context,
            detail = detail,
            "🚨 Developer alert"
        );
        Ok(())
    }
}
