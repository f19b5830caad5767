use ezpay_core::api::{EzpayClient, MerchantCredentials};
use ezpay_core::checkcode::{CheckCodeFields, compute_check_code};
use ezpay_core::config::{Config, EnvironmentType};
use httpmock::MockServer;

pub const MERCHANT_ID: &str = "32365158";
pub const HASH_KEY: &str = "abcdefghijklmnopqrstuvwxyzABCDEF";
pub const HASH_IV: &str = "1234567890abcdef";

#[allow(dead_code)]
pub fn credentials() -> MerchantCredentials {
    MerchantCredentials::new(MERCHANT_ID, HASH_KEY, HASH_IV)
}

#[allow(dead_code)]
pub fn try_start_server() -> Option<MockServer> {
    std::panic::catch_unwind(MockServer::start).ok()
}

#[allow(dead_code)]
pub fn client_for(server: &MockServer, credentials: MerchantCredentials) -> EzpayClient {
    let config = Config::new(EnvironmentType::Testing).with_base_url(server.url("/Api"));
    EzpayClient::new(config, credentials).expect("client")
}

/// Search result for a known invoice, signed with the test credentials.
#[allow(dead_code)]
pub fn signed_search_body() -> String {
    let fields = CheckCodeFields::new("1589331622", "20051309002377869", "500", "0991");
    let check_code = compute_check_code(&fields, &credentials());
    let result = serde_json::json!({
        "MerchantID": MERCHANT_ID,
        "InvoiceNumber": "AA00000076",
        "MerchantOrderNo": "1589331622",
        "InvoiceTransNo": "20051309002377869",
        "TotalAmt": 500,
        "RandomNum": "0991",
        "CheckCode": check_code,
    });
    serde_json::json!({
        "Status": "SUCCESS",
        "Message": "",
        "Result": result.to_string(),
    })
    .to_string()
}

#[allow(dead_code)]
pub fn invalid_body(check_code: &str) -> String {
    serde_json::json!({
        "Status": "SUCCESS",
        "Message": "invoice voided",
        "Result": {
            "InvoiceNumber": "AA00000076",
            "CreateTime": "2026-10-18 10:00:00",
            "CheckCode": check_code,
        },
    })
    .to_string()
}
