//! Barcode decoding

use super::ScanError;
use async_trait::async_trait;
use std::fmt;

/// Barcode formats accepted by the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Code128,
    Code39,
    QrCode,
    DataMatrix,
}

impl Symbology {
    /// Everything a parts label is printed with
    pub const ALL: [Symbology; 8] = [
        Symbology::Ean13,
        Symbology::Ean8,
        Symbology::UpcA,
        Symbology::UpcE,
        Symbology::Code128,
        Symbology::Code39,
        Symbology::QrCode,
        Symbology::DataMatrix,
    ];
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Symbology::Ean13 => "EAN-13",
            Symbology::Ean8 => "EAN-8",
            Symbology::UpcA => "UPC-A",
            Symbology::UpcE => "UPC-E",
            Symbology::Code128 => "Code 128",
            Symbology::Code39 => "Code 39",
            Symbology::QrCode => "QR",
            Symbology::DataMatrix => "Data Matrix",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedCode {
    pub code: String,
    pub symbology: Symbology,
}

/// Platform barcode decoder
#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    /// Wait for the first code in any of `symbologies`. Cancellation by
    /// dropping the future must release the camera.
    async fn decode(&self, symbologies: &[Symbology]) -> Result<ScannedCode, ScanError>;
}
