use std::path::PathBuf;
use std::process::{Command, Output};

use ezpay_core::checkcode::{CheckCodeFields, compute_check_code};
use ezpay_core::crypto::encrypt_hex;
use ezpay_core::MerchantCredentials;
use httpmock::{Method::POST, MockServer};
use serde_json::{Value, json};

const MERCHANT_ID: &str = "32365158";
const HASH_KEY: &str = "abcdefghijklmnopqrstuvwxyzABCDEF";
const HASH_IV: &str = "1234567890abcdef";

fn cli_exe() -> &'static str {
    env!("CARGO_BIN_EXE_ezpay")
}

fn try_start_server() -> Option<MockServer> {
    std::panic::catch_unwind(MockServer::start).ok()
}

fn unique_temp_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let nonce = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    path.push(format!("{prefix}-{nonce}.json"));
    path
}

/// Command with inherited ezPay settings removed.
fn ezpay() -> Command {
    let mut cmd = Command::new(cli_exe());
    for var in [
        "EZPAY_MERCHANT_ID",
        "EZPAY_HASH_KEY",
        "EZPAY_HASH_IV",
        "EZPAY_BASE_URL",
        "EZPAY_ENV",
    ] {
        cmd.env_remove(var);
    }
    cmd.env("RUST_LOG", "off");
    cmd
}

fn with_credentials<'a>(cmd: &'a mut Command, base_url: &str) -> &'a mut Command {
    cmd.args([
        "--merchant-id",
        MERCHANT_ID,
        "--hash-key",
        HASH_KEY,
        "--hash-iv",
        HASH_IV,
        "--base-url",
        base_url,
    ])
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout json")
}

#[test]
fn help_lists_subcommands() {
    let output = ezpay().arg("--help").output().expect("run cli");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for sub in ["create", "query", "invalidate", "decrypt"] {
        assert!(stdout.contains(sub), "missing {sub} in help");
    }
}

#[test]
fn missing_credentials_fail() {
    let output = ezpay()
        .args(["decrypt", "--post-data", "00"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--merchant-id"));
}

#[test]
fn invalid_environment_is_rejected() {
    let output = ezpay()
        .args(["--env", "staging"])
        .args(["--merchant-id", MERCHANT_ID, "--hash-key", HASH_KEY])
        .args(["--hash-iv", HASH_IV, "decrypt", "--post-data", "00"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("staging"));
}

#[test]
fn decrypt_prints_payload_fields() {
    let payload = encrypt_hex(
        "InvoiceNumber=AA00000076&RandomNum=0991&TotalAmt=500",
        HASH_KEY.as_bytes(),
        HASH_IV.as_bytes(),
    )
    .expect("encrypt");
    let output = with_credentials(&mut ezpay(), "http://127.0.0.1:1/Api")
        .args(["decrypt", "--post-data", &payload])
        .output()
        .expect("run cli");
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output),
        json!({"InvoiceNumber": "AA00000076", "RandomNum": "0991", "TotalAmt": "500"})
    );
}

#[test]
fn decrypt_with_wrong_key_fails_with_message() {
    let payload = encrypt_hex("A=1", b"ejCk326UnaZWKisg", HASH_IV.as_bytes()).expect("encrypt");
    let output = with_credentials(&mut ezpay(), "http://127.0.0.1:1/Api")
        .args(["decrypt", "--post-data", &payload])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Error:"));
}

#[test]
fn invalidate_without_random_num_prints_response() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let invalid = server.mock(|when, then| {
        when.method(POST)
            .path("/Api/invoice_invalid")
            .body_contains(format!("MerchantID_={MERCHANT_ID}&PostData_="));
        then.status(200).body(
            json!({
                "Status": "SUCCESS",
                "Message": "invoice voided",
                "Result": {"InvoiceNumber": "AA00000076"},
            })
            .to_string(),
        );
    });

    let output = with_credentials(&mut ezpay(), &server.url("/Api"))
        .args(["invalidate", "--invoice-number", "AA00000076"])
        .args(["--reason", "buyer cancelled"])
        .output()
        .expect("run cli");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let body = stdout_json(&output);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["status"], json!("SUCCESS"));
    assert_eq!(body["result"]["InvoiceNumber"], json!("AA00000076"));
    invalid.assert();
}

#[test]
fn invalidate_with_random_num_rejects_tampered_code() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let credentials = MerchantCredentials::new(MERCHANT_ID, HASH_KEY, HASH_IV);
    let fields = CheckCodeFields::new("1589331622", "20051309002377869", "500", "0991");
    let check_code = compute_check_code(&fields, &credentials);
    server.mock(|when, then| {
        when.method(POST).path("/Api/invoice_search");
        then.status(200).body(
            json!({
                "Status": "SUCCESS",
                "Message": "",
                "Result": {
                    "InvoiceNumber": "AA00000076",
                    "MerchantOrderNo": "1589331622",
                    "InvoiceTransNo": "20051309002377869",
                    "TotalAmt": 500,
                    "RandomNum": "0991",
                    "CheckCode": check_code,
                },
            })
            .to_string(),
        );
    });
    server.mock(|when, then| {
        when.method(POST).path("/Api/invoice_invalid");
        then.status(200).body(
            json!({
                "Status": "SUCCESS",
                "Message": "",
                "Result": {"InvoiceNumber": "AA00000076", "CheckCode": "0".repeat(64)},
            })
            .to_string(),
        );
    });

    let output = with_credentials(&mut ezpay(), &server.url("/Api"))
        .args(["invalidate", "--invoice-number", "AA00000076"])
        .args(["--reason", "typo", "--random-num", "0991"])
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
    assert!(String::from_utf8_lossy(&output.stderr).contains("check code mismatch"));
}

#[test]
fn create_reads_fields_file() {
    let server = match try_start_server() {
        Some(server) => server,
        None => return,
    };
    let issue = server.mock(|when, then| {
        when.method(POST).path("/Api/invoice_issue");
        then.status(200).body(
            json!({
                "Status": "LIB10003",
                "Message": "duplicate order number",
                "Result": "",
            })
            .to_string(),
        );
    });

    let fields = unique_temp_path("ezpay-fields");
    std::fs::write(
        &fields,
        json!({
            "MerchantOrderNo": "1589331622",
            "Status": "1",
            "Category": "B2C",
            "BuyerName": "Wang",
            "TotalAmt": 500,
        })
        .to_string(),
    )
    .expect("write fields");

    let output = with_credentials(&mut ezpay(), &server.url("/Api"))
        .args(["create", "--fields"])
        .arg(&fields)
        .output()
        .expect("run cli");
    let _ = std::fs::remove_file(&fields);

    assert!(output.status.success());
    let body = stdout_json(&output);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["status"], json!("LIB10003"));
    assert_eq!(body["message"], json!("duplicate order number"));
    issue.assert();
}

#[test]
fn query_requires_a_lookup_key() {
    let output = with_credentials(&mut ezpay(), "http://127.0.0.1:1/Api")
        .arg("query")
        .output()
        .expect("run cli");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("--invoice-number"));
}
