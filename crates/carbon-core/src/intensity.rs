//! Grid carbon-intensity provider
//!
//! Maps cloud regions (and PaaS identifiers that embed a zone code) to
//! an average grid intensity in gCO2 per kWh. Unrecognized regions fall
//! back to the 2024 European average.

use crate::constants::CARBON_INTENSITY_EUROPE;

/// PaaS zone codes to Azure regions. Zone codes are matched after
/// stripping digits, either on the whole identifier or on the parts
/// between hyphens.
const ZONES: &[(&str, &str)] = &[
    ("EUS", "eastus"),
    ("WUS", "westus"),
    ("NE", "northeurope"),
    ("EUN", "northeurope"),
    ("IRL", "northeurope"),
    ("FC", "francecentral"),
    ("SA", "southeastasia"),
    ("GWC", "germanywestcentral"),
    ("ERD", "germanywestcentral"),
    ("MUC", "germanywestcentral"),
    ("CDF", "germanywestcentral"),
    ("CDFDEV", "germanywestcentral"),
    ("NLD", "westeurope"),
    ("WE", "westeurope"),
    ("NGI", "northeurope"),
    ("NET", "westeurope"),
    ("NCE", "francesouth"),
];

/// 2024 averages per region (Our World in Data).
const REGION_CARBON_INTENSITY: &[(&str, f64)] = &[
    ("australiaeast", 552.0),
    ("centralus", 384.0),
    ("eastasia", 560.0),
    ("eastus", 384.0),
    ("eastus2", 384.0),
    ("francecentral", 44.0),
    ("francesouth", 44.0),
    ("germanywestcentral", 344.0),
    ("northcentralus", 384.0),
    ("northeurope", 280.0),
    ("southeastasia", 499.0),
    ("swedencentral", 36.0),
    ("uaenorth", 493.0),
    ("uksouth", 211.0),
    ("westeurope", 253.0),
    ("westus", 384.0),
    ("westus2", 384.0),
    ("centralindia", 708.0),
];

/// Intensity for a cloud region, or the European average when the
/// region is not in the table.
pub fn intensity_for_region(region: &str) -> f64 {
    REGION_CARBON_INTENSITY
        .iter()
        .find(|(name, _)| *name == region)
        .map(|(_, ci)| *ci)
        .unwrap_or(CARBON_INTENSITY_EUROPE)
}

/// Whether the region is present in the intensity table. The daemon
/// uses this to report how many VMs fell back to the European average.
pub fn is_known_region(region: &str) -> bool {
    REGION_CARBON_INTENSITY.iter().any(|(name, _)| *name == region)
}

fn strip_digits(text: &str) -> String {
    text.chars().filter(|c| !c.is_ascii_digit()).collect()
}

/// Extracts the Azure region encoded in a PaaS identifier, if any.
fn zone_from_paas(paas: &str) -> Option<&'static str> {
    let lookup = |token: &str| {
        ZONES
            .iter()
            .find(|(code, _)| *code == token)
            .map(|(_, region)| *region)
    };

    let direct = strip_digits(&paas.to_uppercase());
    if let Some(region) = lookup(&direct) {
        return Some(region);
    }
    for part in paas.to_uppercase().split('-') {
        if let Some(region) = lookup(&strip_digits(part)) {
            return Some(region);
        }
    }
    None
}

/// Intensity for a PaaS identifier, resolving its embedded zone code
/// first, falling back to the European average when nothing matches.
pub fn intensity_for_paas(paas: &str) -> f64 {
    match zone_from_paas(paas) {
        Some(region) => intensity_for_region(region),
        None => CARBON_INTENSITY_EUROPE,
    }
}
