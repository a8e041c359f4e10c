//! Output file naming

use std::path::{Path, PathBuf};

/// Prefix of the default output name
pub const DEFAULT_PREFIX: &str = "Split_";

/// Extension every output name ends with
pub const PDF_EXTENSION: &str = ".pdf";

/// Resolve the output file name for a run.
///
/// - no custom name (or only whitespace): `Split_<source stem>.pdf`
/// - custom name without a `.pdf` suffix (checked case-insensitively): suffix appended
/// - otherwise the custom name as given
pub fn resolve_output_name(source: &Path, custom_name: Option<&str>) -> String {
    match custom_name.map(str::trim).filter(|name| !name.is_empty()) {
        None => {
            let stem = source
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            format!("{DEFAULT_PREFIX}{stem}{PDF_EXTENSION}")
        }
        Some(name) if has_pdf_extension(name) => name.to_string(),
        Some(name) => format!("{name}{PDF_EXTENSION}"),
    }
}

/// Resolve the full output path, relative to `output_dir` when one is given
pub fn resolve_output_path(
    source: &Path,
    custom_name: Option<&str>,
    output_dir: Option<&Path>,
) -> PathBuf {
    let name = resolve_output_name(source, custom_name);
    match output_dir {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

fn has_pdf_extension(name: &str) -> bool {
    name.len() >= PDF_EXTENSION.len()
        && name
            .get(name.len() - PDF_EXTENSION.len()..)
            .is_some_and(|suffix| suffix.eq_ignore_ascii_case(PDF_EXTENSION))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_name_from_source() {
        let source = Path::new("invoice.pdf");
        assert_eq!(resolve_output_name(source, None), "Split_invoice.pdf");
        assert_eq!(resolve_output_name(source, Some("")), "Split_invoice.pdf");
        assert_eq!(resolve_output_name(source, Some("   ")), "Split_invoice.pdf");
    }

    #[test]
    fn test_default_name_uses_basename_only() {
        let source = Path::new("/tmp/sheets/amazon.orders.pdf");
        assert_eq!(resolve_output_name(source, None), "Split_amazon.orders.pdf");
    }

    #[test]
    fn test_custom_name_gets_extension() {
        let source = Path::new("invoice.pdf");
        assert_eq!(resolve_output_name(source, Some("labels")), "labels.pdf");
        assert_eq!(resolve_output_name(source, Some("labels.pd")), "labels.pd.pdf");
    }

    #[test]
    fn test_custom_name_extension_is_case_insensitive() {
        let source = Path::new("invoice.pdf");
        assert_eq!(resolve_output_name(source, Some("labels.PDF")), "labels.PDF");
        assert_eq!(resolve_output_name(source, Some("labels.pdf")), "labels.pdf");
        assert_eq!(resolve_output_name(source, Some("labels.Pdf")), "labels.Pdf");
    }

    #[test]
    fn test_multibyte_custom_name() {
        let source = Path::new("invoice.pdf");
        assert_eq!(resolve_output_name(source, Some("étiquettes")), "étiquettes.pdf");
        assert_eq!(resolve_output_name(source, Some("ラベル")), "ラベル.pdf");
    }

    #[test]
    fn test_output_path_with_directory() {
        let source = Path::new("in/invoice.pdf");
        assert_eq!(
            resolve_output_path(source, None, Some(Path::new("out"))),
            Path::new("out").join("Split_invoice.pdf")
        );
        assert_eq!(
            resolve_output_path(source, Some("labels"), None),
            PathBuf::from("labels.pdf")
        );
    }
}
