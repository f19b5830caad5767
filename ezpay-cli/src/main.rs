use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use ezpay_core::{
    api::{EzpayClient, InvoiceResponse, MerchantCredentials},
    config::{Config, EnvironmentType},
    invoice::{InvalidInvoice, SearchInvoice},
    params::{ParamValue, Params},
};
use serde_json::{Map, Value, json};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ezpay")]
#[command(about = "ezPay e-invoice CLI", version)]
struct Cli {
    #[command(flatten)]
    merchant: MerchantArgs,
    /// `testing` or `production`
    #[arg(long, env = "EZPAY_ENV", default_value = "testing")]
    env: EnvironmentType,
    #[arg(long, env = "EZPAY_BASE_URL")]
    base_url: Option<String>,
    #[arg(long, default_value_t = 30)]
    timeout_secs: u64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct MerchantArgs {
    #[arg(long, env = "EZPAY_MERCHANT_ID")]
    merchant_id: String,
    #[arg(long, env = "EZPAY_HASH_KEY", hide_env_values = true)]
    hash_key: String,
    #[arg(long, env = "EZPAY_HASH_IV", hide_env_values = true)]
    hash_iv: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue an invoice from a JSON object of request fields.
    Create {
        #[arg(long)]
        fields: PathBuf,
    },
    /// Look an invoice up by invoice number or by order number.
    Query {
        #[arg(long, requires = "random_num", conflicts_with = "merchant_order_no")]
        invoice_number: Option<String>,
        #[arg(long)]
        random_num: Option<String>,
        #[arg(long, requires = "total_amt")]
        merchant_order_no: Option<String>,
        #[arg(long)]
        total_amt: Option<i64>,
    },
    /// Void an invoice; with --random-num the response check code is verified.
    Invalidate {
        #[arg(long)]
        invoice_number: String,
        #[arg(long)]
        reason: String,
        #[arg(long)]
        random_num: Option<String>,
    },
    /// Decrypt a PostData_ payload sent by the service.
    Decrypt {
        #[arg(long)]
        post_data: String,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    match run(cli) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = ?err, "ezpay command failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<Value> {
    let mut config =
        Config::new(cli.env).with_timeout(Duration::from_secs(cli.timeout_secs));
    if let Some(base_url) = cli.base_url {
        config = config.with_base_url(base_url);
    }
    let credentials = MerchantCredentials::new(
        cli.merchant.merchant_id,
        cli.merchant.hash_key,
        cli.merchant.hash_iv,
    );
    let client = EzpayClient::new(config, credentials).context("building ezPay client")?;
    info!(base_url = client.base_url(), "ezPay client ready");

    let response = match cli.command {
        Commands::Create { fields } => {
            let raw = fs::read_to_string(&fields)
                .with_context(|| format!("reading {}", fields.display()))?;
            let value: Value = serde_json::from_str(&raw)
                .with_context(|| format!("parsing {}", fields.display()))?;
            client.create(params_from_json(value)?)?
        }
        Commands::Query {
            invoice_number,
            random_num,
            merchant_order_no,
            total_amt,
        } => {
            let search = match (invoice_number, random_num, merchant_order_no, total_amt) {
                (Some(number), Some(random), _, _) => {
                    SearchInvoice::by_invoice_number(number, random)
                }
                (_, _, Some(order), Some(total)) => SearchInvoice::by_order_number(order, total),
                _ => bail!(
                    "query needs --invoice-number with --random-num, or --merchant-order-no with --total-amt"
                ),
            };
            client.query(search)?
        }
        Commands::Invalidate {
            invoice_number,
            reason,
            random_num,
        } => {
            let mut invalid = InvalidInvoice::new(invoice_number, reason);
            if let Some(random_num) = random_num {
                invalid = invalid.with_random_num(random_num);
            }
            client.invalidate(invalid)?
        }
        Commands::Decrypt { post_data } => {
            let params = client.decrypt_post_data(&post_data)?;
            return Ok(params_to_json(&params));
        }
    };

    Ok(response_to_json(&response))
}

fn params_from_json(value: Value) -> Result<Params> {
    let Value::Object(map) = value else {
        bail!("fields file must hold a JSON object");
    };
    map.into_iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(text) => ParamValue::Text(text),
                Value::Number(number) => number
                    .as_i64()
                    .map(ParamValue::Int)
                    .unwrap_or_else(|| ParamValue::Text(number.to_string())),
                Value::Null => ParamValue::Null,
                other => bail!("field {key} must be a string, number or null (got {other})"),
            };
            Ok((key, value))
        })
        .collect()
}

fn params_to_json(params: &Params) -> Value {
    let map: Map<String, Value> = params
        .iter()
        .map(|(key, value)| {
            let value = value.render().map_or(Value::Null, Value::String);
            (key.to_string(), value)
        })
        .collect();
    Value::Object(map)
}

fn response_to_json(response: &InvoiceResponse) -> Value {
    json!({
        "success": response.is_success(),
        "status": response.status(),
        "message": response.message(),
        "result": response.result(),
    })
}
