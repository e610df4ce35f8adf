#![allow(dead_code)]

use chrono::NaiveDate;
use retail_etl::types::{EnrichedRecord, NormalizedRecord};
use rust_decimal::Decimal;

pub const RAW_HEADER: &str =
    "InvoiceNo,StockCode,Description,Quantity,InvoiceDate,UnitPrice,CustomerID,Country\n";

/// Distinct enriched record per `n`
pub fn enriched(n: usize) -> EnrichedRecord {
    let quantity = (n % 12) as i64 + 1;
    let unit_price = Decimal::new(100 + (n % 500) as i64, 2);
    EnrichedRecord {
        record: NormalizedRecord {
            invoice_no: format!("{}", 536_000 + n),
            stock_code: format!("{}", 20_000 + n % 900),
            description: Some(format!("ITEM {}", n % 900)),
            quantity,
            invoice_timestamp: NaiveDate::from_ymd_opt(2011, 3, 15)
                .unwrap()
                .and_hms_opt(10, (n % 60) as u32, 0)
                .unwrap(),
            unit_price,
            customer_id: format!("{}", 12_000 + n % 4_000),
            country: "United Kingdom".to_string(),
        },
        total_amount: Decimal::from(quantity) * unit_price,
    }
}

pub fn enriched_range(count: usize) -> Vec<EnrichedRecord> {
    (0..count).map(enriched).collect()
}

/// A small raw export exercising imputation, duplicates and returns
pub fn sample_raw_csv() -> String {
    let body = "\
536365,85123A,WHITE HANGING HEART T-LIGHT HOLDER,6,12/1/2010 8:26,2.55,17850,United Kingdom
536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850,United Kingdom
536366,85123A,,6,12/1/2010 8:28,2.55,17850,United Kingdom
536367,85123A,CREAM HANGING HEART T-LIGHT HOLDER,2,12/1/2010 8:34,2.55,13047,United Kingdom
536367,85123A,WHITE HANGING HEART T-LIGHT HOLDER,2,12/1/2010 8:34,2.55,13047,United Kingdom
536365,71053,WHITE METAL LANTERN,6,12/1/2010 8:26,3.39,17850,United Kingdom
C536379,D,Discount,-1,12/1/2010 9:41,27.50,14527,United Kingdom
536414,22139,,56,12/1/2010 11:52,0,,United Kingdom
";
    format!("{RAW_HEADER}{body}")
}
