/// Dynamic scan sub-types understood by the job-style service, with their
/// numeric codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AseScanType {
    FullScan,
    TestOnly,
    PostmanCollection,
}

impl AseScanType {
    pub const ALL: [AseScanType; 3] = [
        AseScanType::FullScan,
        AseScanType::TestOnly,
        AseScanType::PostmanCollection,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            AseScanType::FullScan => "Full Scan",
            AseScanType::TestOnly => "Test Only",
            AseScanType::PostmanCollection => "Postman Collection",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AseScanType::FullScan => "1",
            AseScanType::TestOnly => "3",
            AseScanType::PostmanCollection => "4",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.name().eq_ignore_ascii_case(name))
    }

    pub fn from_code(code: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }
}

/// Code for a scan type name; unknown names are passed through unchanged
pub fn scan_type_code(name: &str) -> String {
    AseScanType::from_name(name)
        .map(|t| t.code().to_string())
        .unwrap_or_else(|| name.to_string())
}

/// Name for a scan type code; unknown codes map to an empty name
pub fn scan_type_name(code: &str) -> String {
    AseScanType::from_code(code)
        .map(|t| t.name().to_string())
        .unwrap_or_default()
}
