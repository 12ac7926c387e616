//! # Catalog Loading
//!
//! Reads a tenant catalog from YAML or JSON and validates it. In strict
//! mode any validation error rejects the whole document; in lenient mode
//! errors are logged and the catalog is returned as-is, leaving malformed
//! rates to be skipped (and reported) per calculation.

use std::path::Path;

use crate::catalog::TaxCatalog;
use crate::error::{CatalogError, CatalogResult};
use crate::validation::{validate_catalog, CatalogValidation};

/// Document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogFormat {
    /// YAML document.
    Yaml,
    /// JSON document.
    Json,
}

impl CatalogFormat {
    /// Infer the format from a file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

/// How validation errors are handled at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadMode {
    /// Reject the catalog on any validation error.
    #[default]
    Strict,
    /// Log validation errors and keep the catalog.
    Lenient,
}

/// A loaded catalog together with its validation report.
#[derive(Debug, Clone)]
pub struct LoadedCatalog {
    /// The parsed catalog.
    pub catalog: TaxCatalog,
    /// Validation findings.
    pub validation: CatalogValidation,
}

/// Load and validate a catalog file.
pub fn load_catalog(path: &Path, mode: LoadMode) -> CatalogResult<LoadedCatalog> {
    let format = CatalogFormat::from_path(path).ok_or_else(|| CatalogError::UnsupportedFormat {
        path: path.to_path_buf(),
    })?;
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            CatalogError::FileNotFound {
                path: path.to_path_buf(),
            }
        } else {
            CatalogError::Io(e)
        }
    })?;
    let catalog: TaxCatalog = match format {
        CatalogFormat::Yaml => {
            serde_yaml::from_str(&content).map_err(|e| CatalogError::YamlParse {
                path: path.to_path_buf(),
                source: e,
            })?
        }
        CatalogFormat::Json => {
            serde_json::from_str(&content).map_err(|e| CatalogError::JsonParse {
                path: path.to_path_buf(),
                source: e,
            })?
        }
    };
    tracing::debug!(path = %path.display(), company_id = %catalog.company_id, "catalog parsed");
    check(catalog, mode)
}

/// Validate an already-parsed catalog under `mode`.
pub fn check(catalog: TaxCatalog, mode: LoadMode) -> CatalogResult<LoadedCatalog> {
    let validation = validate_catalog(&catalog);
    for w in &validation.warnings {
        tracing::warn!(company_id = %catalog.company_id, issue = %w, "catalog warning");
    }
    if !validation.is_valid {
        match mode {
            LoadMode::Strict => {
                return Err(CatalogError::Invalid {
                    issues: validation.errors,
                })
            }
            LoadMode::Lenient => {
                for e in &validation.errors {
                    tracing::warn!(
                        company_id = %catalog.company_id,
                        issue = %e,
                        "catalog error accepted in lenient mode"
                    );
                }
            }
        }
    }
    tracing::info!(
        company_id = %catalog.company_id,
        jurisdictions = catalog.jurisdictions.len(),
        categories = catalog.categories.len(),
        rates = catalog.rates.len(),
        "catalog loaded"
    );
    Ok(LoadedCatalog {
        catalog,
        validation,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
company_id: 5b0e7a0c-1111-4c2b-9a55-000000000001
jurisdictions:
  - id: 5b0e7a0c-2222-4c2b-9a55-000000000001
    jurisdiction_type: federal
    name: United States
    code: US
    priority: 1
categories:
  - id: 5b0e7a0c-3333-4c2b-9a55-000000000001
    name: VoIP
    category_type: voip_fixed
    priority: 10
rates:
  - id: 5b0e7a0c-4444-4c2b-9a55-000000000001
    jurisdiction_id: 5b0e7a0c-2222-4c2b-9a55-000000000001
    category_id: 5b0e7a0c-3333-4c2b-9a55-000000000001
    tax_type: federal
    tax_name: Federal Excise
    rate_type: percentage
    percentage_rate: "3.0"
    priority: 1
    effective_date: "2026-01-01T00:00:00Z"
"#;

    fn write_temp(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_yaml_catalog() {
        let f = write_temp(".yaml", MINIMAL);
        let loaded = load_catalog(f.path(), LoadMode::Strict).unwrap();
        assert_eq!(loaded.catalog.rates.len(), 1);
        assert!(loaded.validation.is_valid);
    }

    #[test]
    fn loads_json_catalog() {
        let yaml: TaxCatalog = serde_yaml::from_str(MINIMAL).unwrap();
        let f = write_temp(".json", &serde_json::to_string(&yaml).unwrap());
        let loaded = load_catalog(f.path(), LoadMode::Strict).unwrap();
        assert_eq!(loaded.catalog, yaml);
    }

    #[test]
    fn strict_mode_rejects_invalid_catalog() {
        let broken = MINIMAL.replace(
            "category_id: 5b0e7a0c-3333-4c2b-9a55-000000000001\n    tax_type",
            "category_id: 5b0e7a0c-3333-4c2b-9a55-00000000dead\n    tax_type",
        );
        let f = write_temp(".yml", &broken);
        let err = load_catalog(f.path(), LoadMode::Strict).unwrap_err();
        assert!(matches!(err, CatalogError::Invalid { .. }));

        let loaded = load_catalog(f.path(), LoadMode::Lenient).unwrap();
        assert!(!loaded.validation.is_valid);
    }

    #[test]
    fn unsupported_extension_and_missing_file() {
        let f = write_temp(".toml", MINIMAL);
        assert!(matches!(
            load_catalog(f.path(), LoadMode::Strict),
            Err(CatalogError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            load_catalog(Path::new("/nonexistent/catalog.yaml"), LoadMode::Strict),
            Err(CatalogError::FileNotFound { .. })
        ));
    }

    #[test]
    fn malformed_yaml_reports_path() {
        let f = write_temp(".yaml", "company_id: [not a uuid");
        let err = load_catalog(f.path(), LoadMode::Strict).unwrap_err();
        assert!(matches!(err, CatalogError::YamlParse { .. }));
        assert!(err.to_string().contains(".yaml"));
    }
}
