// src/normalize/text.rs

use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use crate::config::ColumnRenames;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace pattern should compile"));

/// Compatibility-decompose and drop everything outside ASCII, which removes
/// combining accents ("MUNICÍPIO" -> "MUNICIPIO").
pub fn strip_diacritics(s: &str) -> String {
    s.nfkd().filter(char::is_ascii).collect()
}

/// Diacritics stripped, trimmed, upper-cased. Used for header lookups and
/// for every text cell value.
pub fn fold_text(s: &str) -> String {
    strip_diacritics(s).trim().to_uppercase()
}

/// Map a raw header onto its canonical field name.
///
/// Known variants go through the rename table; anything else becomes
/// lowercase with spaces turned into underscores. Runs of whitespace inside
/// a header count as a single space.
pub fn canonical_header(raw: &str, renames: &ColumnRenames) -> String {
    let raw = raw.trim_start_matches('\u{feff}');
    let folded = WHITESPACE_RUN.replace_all(&fold_text(raw), " ").into_owned();
    if let Some(name) = renames.lookup(&folded) {
        return name.to_string();
    }
    folded.to_lowercase().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_portuguese_accents() {
        assert_eq!(strip_diacritics("PREÇO MÉDIO REVENDA"), "PRECO MEDIO REVENDA");
        assert_eq!(strip_diacritics("São Luís"), "Sao Luis");
        assert_eq!(strip_diacritics("Goiânia"), "Goiania");
    }

    #[test]
    fn fold_trims_and_uppercases() {
        assert_eq!(fold_text("  Florianópolis "), "FLORIANOPOLIS");
        assert_eq!(fold_text("r$/l"), "R$/L");
    }

    #[test]
    fn headers_resolve_through_rename_table() {
        let renames = ColumnRenames::default();
        assert_eq!(canonical_header("MUNICÍPIO", &renames), "municipio");
        assert_eq!(canonical_header("\u{feff}DATA INICIAL", &renames), "data_inicial");
        assert_eq!(
            canonical_header("Número de Postos Pesquisados", &renames),
            "num_postos_pesquisados"
        );
        assert_eq!(canonical_header("COEF DE VARIAÇÃO REVENDA", &renames), "coef_variacao_revenda");
    }

    #[test]
    fn unknown_headers_fall_through_to_snake_case() {
        let renames = ColumnRenames::default();
        assert_eq!(canonical_header(" Margem Média Revenda ", &renames), "margem_media_revenda");
        assert_eq!(canonical_header("PREÇO MÉDIO DISTRIBUIÇÃO", &renames), "preco_medio_distribuicao");
    }

    #[test]
    fn repeated_spaces_in_headers_collapse() {
        let renames = ColumnRenames::default();
        assert_eq!(canonical_header("DATA  FINAL", &renames), "data_final");
        assert_eq!(canonical_header("Margem\tMédia", &renames), "margem_media");
    }
}
