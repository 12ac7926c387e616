//! Service address flags shared by `resolve` and `calculate`.

use clap::Args;
use rust_decimal::Decimal;
use vtax_engine::ServiceAddress;

#[derive(Args, Debug, Clone, Default)]
pub struct AddressArgs {
    /// Street line.
    #[arg(long)]
    pub street: Option<String>,

    /// City name.
    #[arg(long)]
    pub city: Option<String>,

    /// Two-letter state code.
    #[arg(long = "state")]
    pub state_code: Option<String>,

    /// Five-digit zip or ZIP+4.
    #[arg(long = "zip")]
    pub zip_code: Option<String>,

    /// FIPS code (state + county + place).
    #[arg(long = "fips")]
    pub fips_code: Option<String>,

    /// Latitude in decimal degrees.
    #[arg(long = "lat", allow_hyphen_values = true)]
    pub latitude: Option<Decimal>,

    /// Longitude in decimal degrees.
    #[arg(long = "lon", allow_hyphen_values = true)]
    pub longitude: Option<Decimal>,
}

impl AddressArgs {
    pub fn to_address(&self) -> ServiceAddress {
        ServiceAddress {
            street: self.street.clone(),
            city: self.city.clone(),
            municipality: None,
            state_code: self.state_code.clone(),
            zip_code: self.zip_code.clone(),
            fips_code: self.fips_code.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
