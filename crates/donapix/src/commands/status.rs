//! Status command: one-off payment status query.

use serde::Serialize;

use donapix_api::PaymentStatus;

use super::util;
use crate::cli::{GlobalOpts, StatusArgs};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output::{self, Painter};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusView {
    transaction_id: String,
    status: PaymentStatus,
}

fn status_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Paid => "paid",
        PaymentStatus::Pending => "pending",
    }
}

pub async fn handle(
    args: &StatusArgs,
    resolved: &Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let client = util::pix_client(&resolved.checkout)?;
    let status = client.charge_status(&args.transaction_id).await?;

    let painter = Painter::new(&global.color);
    let view = StatusView {
        transaction_id: args.transaction_id.clone(),
        status,
    };
    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            let label = status_label(v.status);
            let styled = if v.status.is_paid() {
                painter.success(label)
            } else {
                painter.warn(label)
            };
            output::detail_block(
                painter,
                &[
                    ("Transaction", v.transaction_id.clone()),
                    ("Status", styled),
                ],
            )
        },
        |v| status_label(v.status).to_owned(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
