// src/model/dimensions.rs

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema},
};
use chrono::{Datelike, Month, NaiveDate};
use std::collections::HashSet;
use tracing::info;

use crate::config::CapitalCities;
use crate::model::keys::{assign_keys, first_wins};
use crate::normalize::NormalizedRecord;
use crate::store::arrow::{
    date_field, dates, flags, ints, key_field, keys, nullable_key_field, nullable_keys, text_field,
    texts, TableRow,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductRow {
    pub product_id: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitRow {
    pub unit_id: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionRow {
    pub region_id: u32,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateRow {
    pub state_id: u32,
    pub description: String,
    /// Null when the state's region is missing or not in the region dimension.
    pub region_id: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MunicipalityRow {
    pub municipality_id: u32,
    pub description: String,
    pub region_id: Option<u32>,
    pub state_id: Option<u32>,
    pub is_capital: u8,
}

/// One weekly survey window with calendar attributes taken from its start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimePeriodRow {
    pub time_id: u32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub day: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonthRow {
    pub month_id: u32,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountryRow {
    pub country_id: u32,
    pub description: String,
}

/// Every dimension of the star schema, built once per run.
#[derive(Debug, Clone, Default)]
pub struct DimensionSet {
    pub products: Vec<ProductRow>,
    pub units: Vec<UnitRow>,
    pub regions: Vec<RegionRow>,
    pub states: Vec<StateRow>,
    pub municipalities: Vec<MunicipalityRow>,
    pub time_periods: Vec<TimePeriodRow>,
    pub months: Vec<MonthRow>,
    pub countries: Vec<CountryRow>,
}

impl DimensionSet {
    /// Build all eight dimensions, parents before children.
    pub fn build(records: &[NormalizedRecord], capitals: &CapitalCities) -> Self {
        let products = build_products(records);
        let units = build_units(records);
        let regions = build_regions(records);
        let states = build_states(records, Some(&regions));
        let municipalities = build_municipalities(records, Some(&states), capitals);
        let time_periods = build_time_periods(records);
        let months = build_months();
        let countries = build_countries(records);

        Self {
            products,
            units,
            regions,
            states,
            municipalities,
            time_periods,
            months,
            countries,
        }
    }
}

/// Distinct non-null values of one text column, keyed by first appearance.
fn keyed_text<'a, F>(records: &'a [NormalizedRecord], column: F) -> Vec<(u32, &'a str)>
where
    F: Fn(&'a NormalizedRecord) -> Option<&'a str>,
{
    assign_keys(records.iter().filter_map(column))
}

pub fn build_products(records: &[NormalizedRecord]) -> Vec<ProductRow> {
    let rows: Vec<ProductRow> = keyed_text(records, |r| r.product.as_deref())
        .into_iter()
        .map(|(product_id, d)| ProductRow {
            product_id,
            description: d.to_string(),
        })
        .collect();
    info!(rows = rows.len(), "built product dimension");
    rows
}

pub fn build_units(records: &[NormalizedRecord]) -> Vec<UnitRow> {
    let rows: Vec<UnitRow> = keyed_text(records, |r| r.unit.as_deref())
        .into_iter()
        .map(|(unit_id, d)| UnitRow {
            unit_id,
            description: d.to_string(),
        })
        .collect();
    info!(rows = rows.len(), "built unit dimension");
    rows
}

pub fn build_regions(records: &[NormalizedRecord]) -> Vec<RegionRow> {
    let rows: Vec<RegionRow> = keyed_text(records, |r| r.region.as_deref())
        .into_iter()
        .map(|(region_id, d)| RegionRow {
            region_id,
            description: d.to_string(),
        })
        .collect();
    info!(rows = rows.len(), "built region dimension");
    rows
}

pub fn build_countries(records: &[NormalizedRecord]) -> Vec<CountryRow> {
    let rows: Vec<CountryRow> = keyed_text(records, |r| r.country.as_deref())
        .into_iter()
        .map(|(country_id, d)| CountryRow {
            country_id,
            description: d.to_string(),
        })
        .collect();
    info!(rows = rows.len(), "built country dimension");
    rows
}

/// States keyed by distinct (state, region) pairs. A state seen with a known
/// region never also gets a null-region row. The region dimension is built
/// from `records` when not supplied.
pub fn build_states(records: &[NormalizedRecord], regions: Option<&[RegionRow]>) -> Vec<StateRow> {
    let built;
    let regions: &[RegionRow] = match regions {
        Some(r) => r,
        None => {
            built = build_regions(records);
            built.as_slice()
        }
    };
    let region_ids = first_wins(regions.iter().map(|r| (r.description.as_str(), r.region_id)));

    let with_region: HashSet<&str> = records
        .iter()
        .filter(|r| r.region.is_some())
        .filter_map(|r| r.state.as_deref())
        .collect();
    let pairs = records
        .iter()
        .filter_map(|r| Some((r.state.as_deref()?, r.region.as_deref())))
        .filter(|(state, region)| region.is_some() || !with_region.contains(state));
    let rows: Vec<StateRow> = assign_keys(pairs)
        .into_iter()
        .map(|(state_id, (state, region))| StateRow {
            state_id,
            description: state.to_string(),
            region_id: region.and_then(|name| region_ids.get(name).copied()),
        })
        .collect();

    let orphans = rows.iter().filter(|s| s.region_id.is_none()).count();
    info!(rows = rows.len(), without_region = orphans, "built state dimension");
    rows
}

/// Municipalities keyed by distinct (municipality, state) pairs, enriched with
/// the state's keys and the capital flag. The state dimension (and, through
/// it, the region dimension) is built from `records` when not supplied.
pub fn build_municipalities(
    records: &[NormalizedRecord],
    states: Option<&[StateRow]>,
    capitals: &CapitalCities,
) -> Vec<MunicipalityRow> {
    let built;
    let states: &[StateRow] = match states {
        Some(s) => s,
        None => {
            built = build_states(records, None);
            built.as_slice()
        }
    };
    let state_keys = first_wins(
        states
            .iter()
            .map(|s| (s.description.as_str(), (s.state_id, s.region_id))),
    );

    let pairs = records
        .iter()
        .filter_map(|r| Some((r.municipality.as_deref()?, r.state.as_deref())));
    let rows: Vec<MunicipalityRow> = assign_keys(pairs)
        .into_iter()
        .map(|(municipality_id, (name, state))| {
            let parent = state.and_then(|s| state_keys.get(s).copied());
            MunicipalityRow {
                municipality_id,
                description: name.to_string(),
                region_id: parent.and_then(|(_, region_id)| region_id),
                state_id: parent.map(|(state_id, _)| state_id),
                is_capital: u8::from(capitals.contains(name)),
            }
        })
        .collect();

    let capitals_found = rows.iter().filter(|m| m.is_capital == 1).count();
    info!(rows = rows.len(), capitals = capitals_found, "built municipality dimension");
    rows
}

/// Distinct (start, end) windows, nulls included, in first-appearance order.
pub fn build_time_periods(records: &[NormalizedRecord]) -> Vec<TimePeriodRow> {
    let rows: Vec<TimePeriodRow> = assign_keys(records.iter().map(|r| (r.start_date, r.end_date)))
        .into_iter()
        .map(|(time_id, (start_date, end_date))| TimePeriodRow {
            time_id,
            start_date,
            end_date,
            year: start_date.map(|d| d.year()),
            month: start_date.map(|d| d.month()),
            week: start_date.map(|d| d.iso_week().week()),
            day: start_date.map(|d| d.day()),
        })
        .collect();
    info!(rows = rows.len(), "built time dimension");
    rows
}

/// Static calendar: 1..=12 with English month names.
pub fn build_months() -> Vec<MonthRow> {
    let rows: Vec<MonthRow> = (1u8..=12)
        .filter_map(|n| Month::try_from(n).ok())
        .map(|m| MonthRow {
            month_id: m.number_from_month(),
            name: m.name().to_string(),
        })
        .collect();
    info!(rows = rows.len(), "built month dimension");
    rows
}

impl TableRow for ProductRow {
    const TABLE: &'static str = "dim_produto";

    fn schema() -> Schema {
        Schema::new(vec![key_field("produto_id"), text_field("produto_descricao")])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.product_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
        ]
    }
}

impl TableRow for UnitRow {
    const TABLE: &'static str = "dim_unidade";

    fn schema() -> Schema {
        Schema::new(vec![key_field("unidade_id"), text_field("unidade_descricao")])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.unit_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
        ]
    }
}

impl TableRow for RegionRow {
    const TABLE: &'static str = "dim_regiao";

    fn schema() -> Schema {
        Schema::new(vec![key_field("regiao_id"), text_field("regiao_descricao")])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.region_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
        ]
    }
}

impl TableRow for StateRow {
    const TABLE: &'static str = "dim_estado";

    fn schema() -> Schema {
        Schema::new(vec![
            key_field("estado_id"),
            text_field("estado_descricao"),
            nullable_key_field("regiao_id"),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.state_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
            nullable_keys(rows.iter().map(|r| r.region_id)),
        ]
    }
}

impl TableRow for MunicipalityRow {
    const TABLE: &'static str = "dim_municipio";

    fn schema() -> Schema {
        Schema::new(vec![
            key_field("municipio_id"),
            text_field("municipio_descricao"),
            nullable_key_field("regiao_id"),
            nullable_key_field("estado_id"),
            Field::new("is_capital", DataType::UInt8, false),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.municipality_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
            nullable_keys(rows.iter().map(|r| r.region_id)),
            nullable_keys(rows.iter().map(|r| r.state_id)),
            flags(rows.iter().map(|r| r.is_capital)),
        ]
    }
}

impl TableRow for TimePeriodRow {
    const TABLE: &'static str = "dim_tempo";

    fn schema() -> Schema {
        Schema::new(vec![
            key_field("tempo_id"),
            date_field("data_inicial", true),
            date_field("data_final", true),
            Field::new("ano", DataType::Int32, true),
            nullable_key_field("mes_id"),
            nullable_key_field("semana"),
            nullable_key_field("dia"),
        ])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.time_id)),
            dates(rows.iter().map(|r| r.start_date)),
            dates(rows.iter().map(|r| r.end_date)),
            ints(rows.iter().map(|r| r.year)),
            nullable_keys(rows.iter().map(|r| r.month)),
            nullable_keys(rows.iter().map(|r| r.week)),
            nullable_keys(rows.iter().map(|r| r.day)),
        ]
    }
}

impl TableRow for MonthRow {
    const TABLE: &'static str = "dim_mes";

    fn schema() -> Schema {
        Schema::new(vec![key_field("mes_id"), text_field("mes_descricao")])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.month_id)),
            texts(rows.iter().map(|r| r.name.as_str())),
        ]
    }
}

impl TableRow for CountryRow {
    const TABLE: &'static str = "dim_pais";

    fn schema() -> Schema {
        Schema::new(vec![key_field("pais_id"), text_field("pais_descricao")])
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            keys(rows.iter().map(|r| r.country_id)),
            texts(rows.iter().map(|r| r.description.as_str())),
        ]
    }
}
