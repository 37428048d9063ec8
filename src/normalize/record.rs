// src/normalize/record.rs

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::HashMap;

/// One source row in the canonical schema. Any field can be missing in a
/// given weekly file, so everything is optional.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedRecord {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub country: Option<String>,
    pub region: Option<String>,
    pub state: Option<String>,
    pub municipality: Option<String>,
    pub product: Option<String>,
    pub unit: Option<String>,
    pub stations_surveyed: Option<i64>,
    pub mean_price: Option<f64>,
    pub price_std_dev: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub price_cv: Option<f64>,
}

/// Column positions of the canonical fields within one file's header.
#[derive(Debug, Clone)]
pub struct FieldIndex {
    positions: HashMap<String, usize>,
}

impl FieldIndex {
    pub fn new(canonical_headers: &[String]) -> Self {
        let mut positions = HashMap::with_capacity(canonical_headers.len());
        for (idx, name) in canonical_headers.iter().enumerate() {
            // first occurrence wins when two raw headers fold onto one name
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { positions }
    }

    fn get<'a>(&self, row: &'a [String], name: &str) -> Option<&'a str> {
        let idx = *self.positions.get(name)?;
        row.get(idx).map(|s| s.trim()).filter(|s| !s.is_empty())
    }

    /// Build a record from an already-normalized row.
    pub fn record(&self, row: &[String]) -> NormalizedRecord {
        let text = |name: &str| self.get(row, name).map(str::to_string);
        let date = |name: &str| self.get(row, name).and_then(parse_date);
        let number = |name: &str| self.get(row, name).and_then(parse_decimal);

        NormalizedRecord {
            start_date: date("data_inicial"),
            end_date: date("data_final"),
            country: text("pais"),
            region: text("regiao"),
            state: text("estado"),
            municipality: text("municipio"),
            product: text("produto"),
            unit: text("unidade_medida"),
            stations_surveyed: self
                .get(row, "num_postos_pesquisados")
                .and_then(parse_count),
            mean_price: number("preco_medio_revenda"),
            price_std_dev: number("desvio_padrao_revenda"),
            min_price: number("preco_minimo_revenda"),
            max_price: number("preco_maximo_revenda"),
            price_cv: number("coef_variacao_revenda"),
        }
    }
}

pub fn parse_date(s: &str) -> Option<NaiveDate> {
    const DATE_FMTS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
    const DATETIME_FMTS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"];

    let s = s.trim();
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }
    None
}

/// Accepts `5.50` and `5,50`; thousands separators are not expected here.
pub fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    let v = if s.contains(',') && !s.contains('.') {
        s.replace(',', ".").parse::<f64>().ok()?
    } else {
        s.parse::<f64>().ok()?
    };
    if v.is_finite() {
        Some(v)
    } else {
        None
    }
}

/// Station counts sometimes arrive as integral floats (`10.0`).
pub fn parse_count(s: &str) -> Option<i64> {
    if let Ok(n) = s.trim().parse::<i64>() {
        return Some(n);
    }
    let v = parse_decimal(s)?;
    if v.fract() == 0.0 && v.abs() < i64::MAX as f64 {
        Some(v as i64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn record_from_canonical_row() {
        let index = FieldIndex::new(&headers(&[
            "data_inicial",
            "data_final",
            "estado",
            "municipio",
            "produto",
            "num_postos_pesquisados",
            "unidade_medida",
            "preco_medio_revenda",
        ]));
        let row = headers(&[
            "2025-01-05",
            "11/01/2025",
            "ACRE",
            "RIO BRANCO",
            "GASOLINA",
            "10.0",
            "R$/L",
            "5,50",
        ]);
        let rec = index.record(&row);
        assert_eq!(rec.start_date, NaiveDate::from_ymd_opt(2025, 1, 5));
        assert_eq!(rec.end_date, NaiveDate::from_ymd_opt(2025, 1, 11));
        assert_eq!(rec.state.as_deref(), Some("ACRE"));
        assert_eq!(rec.stations_surveyed, Some(10));
        assert_eq!(rec.mean_price, Some(5.5));
        // columns absent from the file stay null
        assert_eq!(rec.region, None);
        assert_eq!(rec.price_cv, None);
    }

    #[test]
    fn blank_and_garbage_cells_are_null() {
        let index = FieldIndex::new(&headers(&["produto", "preco_minimo_revenda", "data_inicial"]));
        let rec = index.record(&headers(&["   ", "n/d", "sometime"]));
        assert_eq!(rec.product, None);
        assert_eq!(rec.min_price, None);
        assert_eq!(rec.start_date, None);
    }

    #[test]
    fn datetime_cells_keep_the_date() {
        assert_eq!(
            parse_date("2025-01-05 00:00:00"),
            NaiveDate::from_ymd_opt(2025, 1, 5)
        );
    }

    #[test]
    fn counts_reject_fractions() {
        assert_eq!(parse_count("8"), Some(8));
        assert_eq!(parse_count("8.5"), None);
    }
}
