//! Typed payloads for the issue, search and invalidation calls.
//!
//! Each type converts into the [`Params`] the client sends, with field names
//! spelled exactly as the service expects them.
//!
//! # Examples
//! ```rust
//! use ezpay_core::invoice::{Buyer, Category, IssueInvoice, LineItem};
//!
//! let invoice = IssueInvoice::new(
//!     "ORDER-1001",
//!     Buyer::new("Acme Ltd").with_ubn("54352706"),
//!     Category::B2B,
//!     vec![
//!         LineItem::new("Widget", 1, "pc", 300),
//!         LineItem::new("Gadget", 2, "pc", 100),
//!     ],
//! )
//! .with_amounts(476, 24);
//! let params = invoice.to_params()?;
//! assert_eq!(params.get("ItemName").and_then(|v| v.render()).as_deref(), Some("Widget|Gadget"));
//! # Ok::<(), ezpay_core::invoice::InvoiceError>(())
//! ```
use chrono::NaiveDate;
use thiserror::Error;

use crate::params::{ParamValue, Params};

pub const ITEM_DELIMITER: &str = "|";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvoiceError {
    #[error("an invoice needs at least one line item")]
    NoLineItems,
    #[error("field {field} must not contain `|` (got {value:?})")]
    DelimiterInField { field: &'static str, value: String },
    #[error("line items sum to {items_total}, matching neither Amt {amt} nor TotalAmt {total_amt}")]
    AmountMismatch {
        items_total: i64,
        amt: i64,
        total_amt: i64,
    },
    #[error("required field {0} is empty")]
    EmptyField(&'static str),
    #[error("invoice amounts overflow a 64-bit integer")]
    AmountOverflow,
}

/// When the service should issue the invoice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueStatus {
    Immediate,
    Pending,
    Scheduled(NaiveDate),
}

impl IssueStatus {
    pub fn code(&self) -> &'static str {
        match self {
            IssueStatus::Immediate => "1",
            IssueStatus::Pending => "0",
            IssueStatus::Scheduled(_) => "3",
        }
    }

    fn create_status_time(&self) -> ParamValue {
        match self {
            IssueStatus::Scheduled(date) => date.format("%Y-%m-%d").to_string().into(),
            _ => ParamValue::Null,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Business buyer with a unified business number (triplicate invoice).
    B2B,
    /// Consumer buyer (duplicate invoice).
    B2C,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::B2B => "B2B",
            Category::B2C => "B2C",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxType {
    Taxable,
    ZeroRated,
    Exempt,
    Special,
    Mixed,
}

impl TaxType {
    pub fn code(&self) -> &'static str {
        match self {
            TaxType::Taxable => "1",
            TaxType::ZeroRated => "2",
            TaxType::Exempt => "3",
            TaxType::Special => "4",
            TaxType::Mixed => "9",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buyer {
    name: String,
    ubn: Option<String>,
    address: Option<String>,
    email: Option<String>,
}

impl Buyer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ubn: None,
            address: None,
            email: None,
        }
    }

    /// Unified business number.
    pub fn with_ubn(mut self, ubn: impl Into<String>) -> Self {
        self.ubn = Some(ubn.into());
        self
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    name: String,
    count: i64,
    unit: String,
    price: i64,
    amount: Option<i64>,
}

impl LineItem {
    /// Line with `amount = count * price`; an overflowing product is
    /// reported by [`IssueInvoice::to_params`].
    pub fn new(name: impl Into<String>, count: i64, unit: impl Into<String>, price: i64) -> Self {
        Self {
            name: name.into(),
            count,
            unit: unit.into(),
            price,
            amount: count.checked_mul(price),
        }
    }

    pub fn with_amount(mut self, amount: i64) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` when `count * price` does not fit in an `i64`.
    pub fn amount(&self) -> Option<i64> {
        self.amount
    }
}

fn items_total(items: &[LineItem]) -> Option<i64> {
    items
        .iter()
        .try_fold(0i64, |total, item| total.checked_add(item.amount?))
}

/// Request body for `invoice_issue`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueInvoice {
    merchant_order_no: String,
    status: IssueStatus,
    buyer: Buyer,
    category: Category,
    tax_type: TaxType,
    tax_rate: u32,
    amt: i64,
    tax_amt: i64,
    print_flag: bool,
    items: Vec<LineItem>,
    comment: Option<String>,
}

impl IssueInvoice {
    /// Immediate, taxable at 5%, printed, with `Amt` equal to the item total and no tax.
    pub fn new(
        merchant_order_no: impl Into<String>,
        buyer: Buyer,
        category: Category,
        items: Vec<LineItem>,
    ) -> Self {
        let amt = items_total(&items).unwrap_or_default();
        Self {
            merchant_order_no: merchant_order_no.into(),
            status: IssueStatus::Immediate,
            buyer,
            category,
            tax_type: TaxType::Taxable,
            tax_rate: 5,
            amt,
            tax_amt: 0,
            print_flag: true,
            items,
            comment: None,
        }
    }

    pub fn with_status(mut self, status: IssueStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_tax(mut self, tax_type: TaxType, tax_rate: u32) -> Self {
        self.tax_type = tax_type;
        self.tax_rate = tax_rate;
        self
    }

    /// Pre-tax amount and tax; `TotalAmt` is their sum.
    pub fn with_amounts(mut self, amt: i64, tax_amt: i64) -> Self {
        self.amt = amt;
        self.tax_amt = tax_amt;
        self
    }

    pub fn with_print_flag(mut self, print: bool) -> Self {
        self.print_flag = print;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// `Amt + TaxAmt`, or `None` on overflow.
    pub fn total_amt(&self) -> Option<i64> {
        self.amt.checked_add(self.tax_amt)
    }

    /// Validate and lay out the request fields.
    ///
    /// # Errors
    /// Returns [`InvoiceError`] for an empty item list, empty identifiers,
    /// item text containing the `|` delimiter, overflowing amounts, or totals
    /// that do not add up.
    pub fn to_params(&self) -> Result<Params, InvoiceError> {
        let total_amt = self.validate()?;

        let join = |render: fn(&LineItem) -> String| {
            self.items
                .iter()
                .map(render)
                .collect::<Vec<_>>()
                .join(ITEM_DELIMITER)
        };

        Ok(Params::new()
            .with("Status", self.status.code())
            .with("CreateStatusTime", self.status.create_status_time())
            .with("MerchantOrderNo", self.merchant_order_no.as_str())
            .with("BuyerName", self.buyer.name.as_str())
            .with("BuyerUBN", self.buyer.ubn.clone())
            .with("BuyerAddress", self.buyer.address.clone())
            .with("BuyerEmail", self.buyer.email.clone())
            .with("Category", self.category.as_str())
            .with("TaxType", self.tax_type.code())
            .with("TaxRate", self.tax_rate)
            .with("Amt", self.amt)
            .with("TaxAmt", self.tax_amt)
            .with("TotalAmt", total_amt)
            .with("PrintFlag", if self.print_flag { "Y" } else { "N" })
            .with("ItemName", join(|item| item.name.clone()))
            .with("ItemCount", join(|item| item.count.to_string()))
            .with("ItemUnit", join(|item| item.unit.clone()))
            .with("ItemPrice", join(|item| item.price.to_string()))
            .with(
                "ItemAmt",
                join(|item| item.amount.map(|amount| amount.to_string()).unwrap_or_default()),
            )
            .with("Comment", self.comment.clone()))
    }

    // Returns the checked TotalAmt.
    fn validate(&self) -> Result<i64, InvoiceError> {
        if self.merchant_order_no.trim().is_empty() {
            return Err(InvoiceError::EmptyField("MerchantOrderNo"));
        }
        if self.buyer.name.trim().is_empty() {
            return Err(InvoiceError::EmptyField("BuyerName"));
        }
        if self.items.is_empty() {
            return Err(InvoiceError::NoLineItems);
        }
        for item in &self.items {
            for (field, value) in [("ItemName", &item.name), ("ItemUnit", &item.unit)] {
                if value.contains(ITEM_DELIMITER) {
                    return Err(InvoiceError::DelimiterInField {
                        field,
                        value: value.clone(),
                    });
                }
            }
        }
        let items_total = items_total(&self.items).ok_or(InvoiceError::AmountOverflow)?;
        let total_amt = self.total_amt().ok_or(InvoiceError::AmountOverflow)?;
        if items_total != total_amt && items_total != self.amt {
            return Err(InvoiceError::AmountMismatch {
                items_total,
                amt: self.amt,
                total_amt,
            });
        }
        Ok(total_amt)
    }
}

impl TryFrom<IssueInvoice> for Params {
    type Error = InvoiceError;

    fn try_from(invoice: IssueInvoice) -> Result<Self, Self::Error> {
        invoice.to_params()
    }
}

/// Request body for `invoice_invalid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidInvoice {
    invoice_number: String,
    random_num: Option<String>,
    reason: String,
}

impl InvalidInvoice {
    pub fn new(invoice_number: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            invoice_number: invoice_number.into(),
            random_num: None,
            reason: reason.into(),
        }
    }

    /// Supplying the random number makes the client verify the response's check code.
    pub fn with_random_num(mut self, random_num: impl Into<String>) -> Self {
        self.random_num = Some(random_num.into());
        self
    }
}

impl From<InvalidInvoice> for Params {
    fn from(invalid: InvalidInvoice) -> Self {
        let mut params = Params::new().with("InvoiceNumber", invalid.invoice_number);
        if let Some(random_num) = invalid.random_num {
            params.insert("RandomNum", random_num);
        }
        params.with("InvalidReason", invalid.reason)
    }
}

/// Request body for `invoice_search`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchInvoice {
    /// `SearchType` 0.
    ByInvoiceNumber {
        invoice_number: String,
        random_num: String,
    },
    /// `SearchType` 1.
    ByOrderNumber {
        merchant_order_no: String,
        total_amt: i64,
    },
}

impl SearchInvoice {
    pub fn by_invoice_number(
        invoice_number: impl Into<String>,
        random_num: impl Into<String>,
    ) -> Self {
        SearchInvoice::ByInvoiceNumber {
            invoice_number: invoice_number.into(),
            random_num: random_num.into(),
        }
    }

    pub fn by_order_number(merchant_order_no: impl Into<String>, total_amt: i64) -> Self {
        SearchInvoice::ByOrderNumber {
            merchant_order_no: merchant_order_no.into(),
            total_amt,
        }
    }
}

impl From<SearchInvoice> for Params {
    fn from(search: SearchInvoice) -> Self {
        match search {
            SearchInvoice::ByInvoiceNumber {
                invoice_number,
                random_num,
            } => Params::new()
                .with("SearchType", 0)
                .with("InvoiceNumber", invoice_number)
                .with("RandomNum", random_num),
            SearchInvoice::ByOrderNumber {
                merchant_order_no,
                total_amt,
            } => Params::new()
                .with("SearchType", 1)
                .with("MerchantOrderNo", merchant_order_no)
                .with("TotalAmt", total_amt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn items() -> Vec<LineItem> {
        vec![
            LineItem::new("Widget", 1, "pc", 300),
            LineItem::new("Gadget", 2, "pc", 100),
        ]
    }

    fn rendered(params: &Params, key: &str) -> Option<String> {
        params.get(key).and_then(ParamValue::render)
    }

    #[test]
    fn issue_fields_follow_wire_order() {
        let params = IssueInvoice::new(
            "ORDER-1",
            Buyer::new("Acme Ltd")
                .with_ubn("54352706")
                .with_email("ap@acme.test"),
            Category::B2B,
            items(),
        )
        .with_amounts(476, 24)
        .with_comment("note")
        .to_params()
        .expect("params");

        assert_eq!(
            params.keys().collect::<Vec<_>>(),
            [
                "Status",
                "CreateStatusTime",
                "MerchantOrderNo",
                "BuyerName",
                "BuyerUBN",
                "BuyerAddress",
                "BuyerEmail",
                "Category",
                "TaxType",
                "TaxRate",
                "Amt",
                "TaxAmt",
                "TotalAmt",
                "PrintFlag",
                "ItemName",
                "ItemCount",
                "ItemUnit",
                "ItemPrice",
                "ItemAmt",
                "Comment",
            ]
        );
        assert_eq!(rendered(&params, "ItemName").as_deref(), Some("Widget|Gadget"));
        assert_eq!(rendered(&params, "ItemCount").as_deref(), Some("1|2"));
        assert_eq!(rendered(&params, "ItemAmt").as_deref(), Some("300|200"));
        assert_eq!(rendered(&params, "TotalAmt").as_deref(), Some("500"));
        assert_eq!(rendered(&params, "PrintFlag").as_deref(), Some("Y"));
        // unset optional fields stay in the map but are not sent
        assert!(params.get("BuyerAddress").is_some_and(ParamValue::is_null));
        assert!(!params.encode().contains("CreateStatusTime"));
    }

    #[test]
    fn scheduled_issue_sets_create_status_time() {
        let date = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();
        let params = IssueInvoice::new("ORDER-2", Buyer::new("Jane"), Category::B2C, items())
            .with_status(IssueStatus::Scheduled(date))
            .with_print_flag(false)
            .to_params()
            .expect("params");
        assert_eq!(rendered(&params, "Status").as_deref(), Some("3"));
        assert_eq!(
            rendered(&params, "CreateStatusTime").as_deref(),
            Some("2026-11-02")
        );
        assert_eq!(rendered(&params, "PrintFlag").as_deref(), Some("N"));
        assert_eq!(rendered(&params, "Amt").as_deref(), Some("500"));
    }

    #[test]
    fn issue_validation_errors() {
        let empty = IssueInvoice::new("ORDER-3", Buyer::new("Jane"), Category::B2C, vec![]);
        assert_eq!(empty.to_params(), Err(InvoiceError::NoLineItems));

        let piped = IssueInvoice::new(
            "ORDER-3",
            Buyer::new("Jane"),
            Category::B2C,
            vec![LineItem::new("A|B", 1, "pc", 10)],
        );
        assert!(matches!(
            piped.to_params(),
            Err(InvoiceError::DelimiterInField { field: "ItemName", .. })
        ));

        let no_order = IssueInvoice::new(" ", Buyer::new("Jane"), Category::B2C, items());
        assert_eq!(
            no_order.to_params(),
            Err(InvoiceError::EmptyField("MerchantOrderNo"))
        );

        let mismatched = IssueInvoice::new("ORDER-3", Buyer::new("Jane"), Category::B2C, items())
            .with_amounts(400, 20);
        assert_eq!(
            mismatched.to_params(),
            Err(InvoiceError::AmountMismatch {
                items_total: 500,
                amt: 400,
                total_amt: 420
            })
        );
    }

    #[test]
    fn huge_amounts_are_rejected_instead_of_wrapping() {
        let item = LineItem::new("x", i64::MAX / 2, "pc", 3);
        assert_eq!(item.amount(), None);
        let invoice = IssueInvoice::new("ORDER-5", Buyer::new("Jane"), Category::B2C, vec![item]);
        assert_eq!(invoice.to_params(), Err(InvoiceError::AmountOverflow));

        let summed = IssueInvoice::new(
            "ORDER-5",
            Buyer::new("Jane"),
            Category::B2C,
            vec![
                LineItem::new("a", 1, "pc", i64::MAX),
                LineItem::new("b", 1, "pc", 1),
            ],
        );
        assert_eq!(summed.to_params(), Err(InvoiceError::AmountOverflow));

        let taxed = IssueInvoice::new("ORDER-5", Buyer::new("Jane"), Category::B2C, items())
            .with_amounts(i64::MAX, 1);
        assert_eq!(taxed.total_amt(), None);
        assert_eq!(taxed.to_params(), Err(InvoiceError::AmountOverflow));
    }

    #[test]
    fn try_from_converts_valid_invoice() {
        let invoice = IssueInvoice::new("ORDER-4", Buyer::new("Jane"), Category::B2C, items())
            .with_tax(TaxType::ZeroRated, 0);
        let params = Params::try_from(invoice).expect("params");
        assert_eq!(rendered(&params, "TaxType").as_deref(), Some("2"));
        assert_eq!(rendered(&params, "TaxRate").as_deref(), Some("0"));
    }

    #[test]
    fn invalid_invoice_fields() {
        let params: Params = InvalidInvoice::new("AA00000076", "cancelled").into();
        assert_eq!(params.encode(), "InvoiceNumber=AA00000076&InvalidReason=cancelled");

        let params: Params = InvalidInvoice::new("AA00000076", "cancelled")
            .with_random_num("0991")
            .into();
        assert_eq!(
            params.encode(),
            "InvoiceNumber=AA00000076&RandomNum=0991&InvalidReason=cancelled"
        );
    }

    #[test]
    fn search_invoice_fields() {
        let params: Params = SearchInvoice::by_invoice_number("AA00000076", "0991").into();
        assert_eq!(
            params.encode(),
            "SearchType=0&InvoiceNumber=AA00000076&RandomNum=0991"
        );
        let params: Params = SearchInvoice::by_order_number("ORDER-1", 500).into();
        assert_eq!(params.encode(), "SearchType=1&MerchantOrderNo=ORDER-1&TotalAmt=500");
    }
}
