/// Query parameter that selects the output representation.
pub const DEFAULT_OUTPUT_PARAMETER: &str = "output";

/// Name of the representation every resource registers.
pub const DEFAULT_OUTPUT_NAME: &str = "default";

/// Entity fields that are never serialized unless configured otherwise.
pub const DEFAULT_EXCLUDED_FIELDS: &[&str] = &["active", "_state"];

/// Owned output parameter name.
#[must_use]
pub fn default_output_parameter() -> String {
    DEFAULT_OUTPUT_PARAMETER.to_owned()
}

/// Owned copy of the default exclusion set.
#[must_use]
pub fn default_excluded_fields() -> Vec<String> {
    DEFAULT_EXCLUDED_FIELDS
        .iter()
        .map(|field| (*field).to_owned())
        .collect()
}
