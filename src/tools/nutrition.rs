use schemars::JsonSchema;
use serde::Deserialize;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct BarcodeRequest {
    /// UPC barcode digits as scanned.
    pub barcode: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DescribeRequest {
    /// Product name, e.g. from a barcode lookup.
    pub product_name: String,
}
