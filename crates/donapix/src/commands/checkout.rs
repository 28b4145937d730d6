//! Checkout command: generate a PIX charge and wait for it to be paid.

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, warn};
use url::Url;

use donapix_core::attribution::parse_cookie_header;
use donapix_core::{
    Amount, AttributionResolver, ConversionDispatcher, CustomerInfo, JsonFileStore, LoggingSink,
    QrImage, Transaction, TransactionController, TransactionStatus,
};

use super::util;
use crate::cli::{CheckoutArgs, GlobalOpts};
use crate::config::Resolved;
use crate::error::CliError;
use crate::output::{self, Painter};

/// How long pending relay deliveries may hold up exit.
const DRAIN_LIMIT: Duration = Duration::from_secs(5);

// ── Views ────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeView {
    transaction_id: String,
    amount: String,
    amount_cents: u64,
    code: String,
    qr_image_url: Option<String>,
    expires_at: String,
}

impl From<&Transaction> for ChargeView {
    fn from(tx: &Transaction) -> Self {
        Self {
            transaction_id: tx.id.clone(),
            amount: tx.amount.to_brl(),
            amount_cents: tx.amount.cents(),
            code: tx.code.clone(),
            qr_image_url: match &tx.qr_image {
                QrImage::Remote(url) => Some(url.clone()),
                QrImage::RenderFromCode => None,
            },
            expires_at: tx.expires_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PaidView {
    transaction_id: String,
    status: TransactionStatus,
    amount: String,
}

fn charge_detail(painter: Painter, view: &ChargeView) -> String {
    let mut rows = vec![
        ("Transaction", view.transaction_id.clone()),
        ("Amount", view.amount.clone()),
        ("Expires", view.expires_at.clone()),
    ];
    if let Some(ref url) = view.qr_image_url {
        rows.push(("QR image", url.clone()));
    }
    format!(
        "{}\n\n{}\n\n{}",
        output::detail_block(painter, &rows),
        painter.dim("PIX copia e cola:"),
        view.code
    )
}

// ── Handler ──────────────────────────────────────────────────────────

pub async fn handle(
    args: CheckoutArgs,
    resolved: Resolved,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let amount = util::parse_amount(&args.amount)?;
    let painter = Painter::new(&global.color);
    let checkout = resolved.checkout;

    let backend = Arc::new(util::pix_client(&checkout)?);
    let relay = Arc::new(util::relay_client(&checkout)?);
    let dispatcher = ConversionDispatcher::new(
        checkout.pixels.clone(),
        checkout.source_url.as_ref(),
        Arc::new(LoggingSink),
        relay,
    );
    // Events go to the log sink, which is ready immediately.
    dispatcher.mark_ready();

    let store = JsonFileStore::new(resolved.attribution_file).with_ttl(resolved.attribution_ttl);
    let attribution = AttributionResolver::new(Arc::new(store));
    if args.new_session {
        attribution.reset();
    }
    capture_landing(&attribution, &args, checkout.source_url.as_ref())?;

    let controller =
        TransactionController::new(checkout, backend, dispatcher.clone(), attribution.clone());
    if !args.utm.is_empty() {
        let mut context = attribution.resolve(None);
        context.utm_params.extend(args.utm.iter().cloned());
        controller.set_attribution(context);
    }

    let customer = CustomerInfo {
        name: args.name,
        email: args.email,
        ..CustomerInfo::default()
    };
    controller.initiate_checkout(amount, &customer);

    let spinner = util::spinner("Generating PIX code...", global.quiet);
    let generated = controller.generate(amount, customer).await;
    spinner.finish_and_clear();

    let outcome = match generated {
        Ok(transaction) => {
            let view = ChargeView::from(&transaction);
            let out = output::render_single(
                &global.output,
                &view,
                |v| charge_detail(painter, v),
                |v| v.code.clone(),
            );
            output::print_output(&out, global.quiet);

            if args.no_wait {
                Ok(())
            } else {
                wait_for_payment(&controller, amount, painter, global).await
            }
        }
        Err(e) => Err(e.into()),
    };

    if !dispatcher.drain(DRAIN_LIMIT).await {
        warn!("some conversion deliveries did not finish before exit");
    }
    outcome
}

/// Record the landing page's campaign tags and pixel cookies.
fn capture_landing(
    attribution: &AttributionResolver,
    args: &CheckoutArgs,
    source_url: Option<&Url>,
) -> Result<(), CliError> {
    let landing = match args.landing_url.as_deref() {
        Some(raw) => Some(raw.parse::<Url>().map_err(|_| CliError::Validation {
            field: "landing-url".into(),
            reason: format!("invalid URL: {raw}"),
        })?),
        None => source_url.cloned(),
    };

    let Some(url) = landing else {
        if args.cookie.is_some() {
            warn!("--cookie needs --landing-url or a profile source_url, ignoring");
        }
        return Ok(());
    };

    let cookies = args
        .cookie
        .as_deref()
        .map(parse_cookie_header)
        .unwrap_or_default();
    let context = attribution.capture(&url, &cookies);
    debug!(tags = context.utm_params.len(), "landing page captured");
    Ok(())
}

// ── Waiting ──────────────────────────────────────────────────────────

async fn wait_for_payment(
    controller: &TransactionController,
    amount: Amount,
    painter: Painter,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let mut state = controller.state();
    let bar = util::spinner("Waiting for payment...", global.quiet);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let result = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                controller.close();
                break Err(CliError::Interrupted);
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break Err(CliError::Interrupted);
                }
                let snapshot = state.borrow_and_update().clone();
                let transaction_id = snapshot.transaction_id().unwrap_or_default().to_owned();
                match snapshot.status {
                    TransactionStatus::Paid => break Ok(transaction_id),
                    TransactionStatus::Expired => {
                        break Err(CliError::Expired { transaction_id });
                    }
                    _ => {}
                }
            }
            _ = ticker.tick() => update_countdown(&bar, controller),
        }
    };
    bar.finish_and_clear();

    let transaction_id = result?;
    let view = PaidView {
        transaction_id,
        status: TransactionStatus::Paid,
        amount: amount.to_brl(),
    };
    let out = output::render_single(
        &global.output,
        &view,
        |v| {
            format!(
                "{} {} ({})",
                painter.success("Payment confirmed"),
                v.amount,
                painter.dim(&v.transaction_id)
            )
        },
        |v| v.status.to_string(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

fn update_countdown(bar: &ProgressBar, controller: &TransactionController) {
    if let Some(countdown) = controller.countdown() {
        bar.set_message(format!("Waiting for payment, expires in {countdown}"));
    }
}
