// src/model/facts.rs

use arrow::{
    array::ArrayRef,
    datatypes::{DataType, Field, Schema},
};
use chrono::NaiveDate;
use std::{
    collections::{BTreeMap, HashMap},
    fmt,
};
use tracing::{debug, info, warn};

use crate::error::EtlError;
use crate::model::dimensions::{CountryRow, DimensionSet, MunicipalityRow, StateRow, TimePeriodRow};
use crate::model::keys::first_wins;
use crate::normalize::NormalizedRecord;
use crate::store::arrow::{
    counts, date_field, dates, flags, floats, ints, key_field, keys, nullable_key_field,
    nullable_keys, TableRow,
};

/// Fact tables require exactly one country; returns its key.
pub fn single_country_id(countries: &[CountryRow]) -> Result<u32, EtlError> {
    match countries {
        [only] => Ok(only.country_id),
        other => Err(EtlError::CountryCardinality(other.len())),
    }
}

/// Natural-key lookups over a built `DimensionSet`.
///
/// Every lookup resolves to the first dimension row carrying the natural key,
/// so a duplicated key never fans a record out into several facts.
pub struct DimensionIndex<'a> {
    products: HashMap<&'a str, u32>,
    units: HashMap<&'a str, u32>,
    regions: HashMap<&'a str, u32>,
    states: HashMap<&'a str, &'a StateRow>,
    municipalities: HashMap<(&'a str, Option<u32>), &'a MunicipalityRow>,
    periods: HashMap<(Option<NaiveDate>, Option<NaiveDate>), &'a TimePeriodRow>,
    country_id: u32,
}

impl<'a> DimensionIndex<'a> {
    pub fn new(dims: &'a DimensionSet) -> Result<Self, EtlError> {
        Ok(Self {
            products: first_wins(dims.products.iter().map(|p| (p.description.as_str(), p.product_id))),
            units: first_wins(dims.units.iter().map(|u| (u.description.as_str(), u.unit_id))),
            regions: first_wins(dims.regions.iter().map(|r| (r.description.as_str(), r.region_id))),
            states: first_wins(dims.states.iter().map(|s| (s.description.as_str(), s))),
            municipalities: first_wins(
                dims.municipalities
                    .iter()
                    .map(|m| ((m.description.as_str(), m.state_id), m)),
            ),
            periods: first_wins(
                dims.time_periods
                    .iter()
                    .map(|t| ((t.start_date, t.end_date), t)),
            ),
            country_id: single_country_id(&dims.countries)?,
        })
    }

    pub fn country_id(&self) -> u32 {
        self.country_id
    }

    fn product_id(&self, r: &NormalizedRecord) -> Option<u32> {
        self.products.get(r.product.as_deref()?).copied()
    }

    fn unit_id(&self, r: &NormalizedRecord) -> Option<u32> {
        self.units.get(r.unit.as_deref()?).copied()
    }

    fn region_id(&self, r: &NormalizedRecord) -> Option<u32> {
        self.regions.get(r.region.as_deref()?).copied()
    }

    fn state(&self, r: &NormalizedRecord) -> Option<&'a StateRow> {
        self.states.get(r.state.as_deref()?).copied()
    }

    fn municipality(&self, r: &NormalizedRecord, state_id: u32) -> Option<&'a MunicipalityRow> {
        self.municipalities
            .get(&(r.municipality.as_deref()?, Some(state_id)))
            .copied()
    }

    fn period(&self, r: &NormalizedRecord) -> Option<&'a TimePeriodRow> {
        self.periods.get(&(r.start_date, r.end_date)).copied()
    }

    /// Grouping columns shared by every aggregated grain.
    fn fact_key(&self, r: &NormalizedRecord) -> FactKey {
        let period = self.period(r);
        FactKey {
            start_date: r.start_date,
            end_date: r.end_date,
            year: period.and_then(|p| p.year),
            month: period.and_then(|p| p.month),
            week: period.and_then(|p| p.week),
            product_id: self.product_id(r),
            unit_id: self.unit_id(r),
            country_id: self.country_id,
        }
    }

    /// A complete municipality-grain fact, or `None` when any key or
    /// measure cannot be resolved.
    fn municipality_fact(&self, r: &NormalizedRecord) -> Option<MunicipalityFact> {
        let period = self.period(r)?;
        let state = self.state(r)?;
        let municipality = self.municipality(r, state.state_id)?;
        Some(MunicipalityFact {
            start_date: r.start_date?,
            end_date: r.end_date?,
            year: period.year?,
            month: period.month?,
            week: period.week?,
            product_id: self.product_id(r)?,
            unit_id: self.unit_id(r)?,
            country_id: self.country_id,
            region_id: state.region_id?,
            state_id: state.state_id,
            municipality_id: municipality.municipality_id,
            is_capital: municipality.is_capital,
            stations_surveyed: r.stations_surveyed?,
            mean_price: r.mean_price?,
            price_std_dev: r.price_std_dev?,
            min_price: r.min_price?,
            max_price: r.max_price?,
            price_cv: r.price_cv?,
        })
    }
}

/// Finest grain: one row per surviving source record, no nulls anywhere.
#[derive(Debug, Clone, PartialEq)]
pub struct MunicipalityFact {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub week: u32,
    pub product_id: u32,
    pub unit_id: u32,
    pub country_id: u32,
    pub region_id: u32,
    pub state_id: u32,
    pub municipality_id: u32,
    pub is_capital: u8,
    pub stations_surveyed: i64,
    pub mean_price: f64,
    pub price_std_dev: f64,
    pub min_price: f64,
    pub max_price: f64,
    pub price_cv: f64,
}

/// Grouping columns common to the state, region and country grains.
/// Null keys are a group of their own and sort first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FactKey {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub year: Option<i32>,
    pub month: Option<u32>,
    pub week: Option<u32>,
    pub product_id: Option<u32>,
    pub unit_id: Option<u32>,
    pub country_id: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Measures {
    pub stations_surveyed: i64,
    pub mean_price: Option<f64>,
    pub price_std_dev: Option<f64>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub price_cv: Option<f64>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn push(&mut self, v: Option<f64>) {
        if let Some(v) = v {
            self.sum += v;
            self.n += 1;
        }
    }

    fn value(self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Sum of stations, mean of price/std-dev/cv, min of mins, max of maxes.
/// Null measures are skipped.
#[derive(Debug, Default)]
struct MeasureAccumulator {
    stations: i64,
    mean: Mean,
    std_dev: Mean,
    cv: Mean,
    min: Option<f64>,
    max: Option<f64>,
}

impl MeasureAccumulator {
    fn push(&mut self, r: &NormalizedRecord) {
        self.stations += r.stations_surveyed.unwrap_or(0);
        self.mean.push(r.mean_price);
        self.std_dev.push(r.price_std_dev);
        self.cv.push(r.price_cv);
        if let Some(v) = r.min_price {
            self.min = Some(self.min.map_or(v, |m| m.min(v)));
        }
        if let Some(v) = r.max_price {
            self.max = Some(self.max.map_or(v, |m| m.max(v)));
        }
    }

    fn finish(self) -> Measures {
        Measures {
            stations_surveyed: self.stations,
            mean_price: self.mean.value(),
            price_std_dev: self.std_dev.value(),
            min_price: self.min,
            max_price: self.max,
            price_cv: self.cv.value(),
        }
    }
}

/// Geographic part of an aggregated grain's grouping key.
pub trait Geography: Clone + Ord + fmt::Debug {
    const TABLE: &'static str;
    fn resolve(r: &NormalizedRecord, index: &DimensionIndex<'_>) -> Self;
    fn fields() -> Vec<Field>;
    fn columns(rows: &[&Self]) -> Vec<ArrayRef>;
}

/// State grain: the region comes from the state dimension, not the record.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct StateGeo {
    pub region_id: Option<u32>,
    pub state_id: Option<u32>,
}

impl Geography for StateGeo {
    const TABLE: &'static str = "fato_precos_estado";

    fn resolve(r: &NormalizedRecord, index: &DimensionIndex<'_>) -> Self {
        let state = index.state(r);
        Self {
            region_id: state.and_then(|s| s.region_id),
            state_id: state.map(|s| s.state_id),
        }
    }

    fn fields() -> Vec<Field> {
        vec![nullable_key_field("regiao_id"), nullable_key_field("estado_id")]
    }

    fn columns(rows: &[&Self]) -> Vec<ArrayRef> {
        vec![
            nullable_keys(rows.iter().map(|g| g.region_id)),
            nullable_keys(rows.iter().map(|g| g.state_id)),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RegionGeo {
    pub region_id: Option<u32>,
}

impl Geography for RegionGeo {
    const TABLE: &'static str = "fato_precos_regiao";

    fn resolve(r: &NormalizedRecord, index: &DimensionIndex<'_>) -> Self {
        Self {
            region_id: index.region_id(r),
        }
    }

    fn fields() -> Vec<Field> {
        vec![nullable_key_field("regiao_id")]
    }

    fn columns(rows: &[&Self]) -> Vec<ArrayRef> {
        vec![nullable_keys(rows.iter().map(|g| g.region_id))]
    }
}

/// Country grain carries no geography beyond `pais_id`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CountryGeo;

impl Geography for CountryGeo {
    const TABLE: &'static str = "fato_precos_pais";

    fn resolve(_: &NormalizedRecord, _: &DimensionIndex<'_>) -> Self {
        CountryGeo
    }

    fn fields() -> Vec<Field> {
        Vec::new()
    }

    fn columns(_: &[&Self]) -> Vec<ArrayRef> {
        Vec::new()
    }
}

/// One row of an aggregated grain.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateFact<G> {
    pub key: FactKey,
    pub geo: G,
    pub measures: Measures,
}

pub type StateFact = AggregateFact<StateGeo>;
pub type RegionFact = AggregateFact<RegionGeo>;
pub type CountryFact = AggregateFact<CountryGeo>;

/// All four grains for one run.
#[derive(Debug, Clone, Default)]
pub struct FactSet {
    pub municipality: Vec<MunicipalityFact>,
    pub state: Vec<StateFact>,
    pub region: Vec<RegionFact>,
    pub country: Vec<CountryFact>,
}

impl FactSet {
    /// An empty record set yields empty fact tables without checking the
    /// country dimension.
    pub fn build(records: &[NormalizedRecord], dims: &DimensionSet) -> Result<Self, EtlError> {
        if records.is_empty() {
            warn!("no records; fact tables will be empty");
            return Ok(Self::default());
        }
        let index = DimensionIndex::new(dims)?;
        debug!(country_id = index.country_id(), "resolved country");
        Ok(Self {
            municipality: build_municipality_facts(records, &index),
            state: build_state_facts(records, &index),
            region: build_region_facts(records, &index),
            country: build_country_facts(records, &index),
        })
    }
}

pub fn build_municipality_facts(
    records: &[NormalizedRecord],
    index: &DimensionIndex<'_>,
) -> Vec<MunicipalityFact> {
    let facts: Vec<MunicipalityFact> = records
        .iter()
        .filter_map(|r| index.municipality_fact(r))
        .collect();
    let dropped = records.len() - facts.len();
    if dropped > 0 {
        debug!(dropped, "records with unresolved keys or null measures left out of municipality grain");
    }
    info!(rows = facts.len(), "built {}", MunicipalityFact::TABLE);
    facts
}

pub fn build_state_facts(records: &[NormalizedRecord], index: &DimensionIndex<'_>) -> Vec<StateFact> {
    build_aggregate_facts(records, index)
}

pub fn build_region_facts(
    records: &[NormalizedRecord],
    index: &DimensionIndex<'_>,
) -> Vec<RegionFact> {
    build_aggregate_facts(records, index)
}

pub fn build_country_facts(
    records: &[NormalizedRecord],
    index: &DimensionIndex<'_>,
) -> Vec<CountryFact> {
    build_aggregate_facts(records, index)
}

/// Group by the common key plus `G`, output ordered by that grouping key.
pub fn build_aggregate_facts<G: Geography>(
    records: &[NormalizedRecord],
    index: &DimensionIndex<'_>,
) -> Vec<AggregateFact<G>> {
    let mut groups: BTreeMap<(FactKey, G), MeasureAccumulator> = BTreeMap::new();
    for r in records {
        groups
            .entry((index.fact_key(r), G::resolve(r, index)))
            .or_default()
            .push(r);
    }
    let facts: Vec<AggregateFact<G>> = groups
        .into_iter()
        .map(|((key, geo), acc)| AggregateFact {
            key,
            geo,
            measures: acc.finish(),
        })
        .collect();
    info!(rows = facts.len(), "built {}", G::TABLE);
    facts
}

fn key_fields() -> Vec<Field> {
    vec![
        date_field("data_inicial", true),
        date_field("data_final", true),
        Field::new("ano", DataType::Int32, true),
        nullable_key_field("mes_id"),
        nullable_key_field("semana"),
        nullable_key_field("produto_id"),
        nullable_key_field("unidade_id"),
        key_field("pais_id"),
    ]
}

fn measure_fields(nullable: bool) -> Vec<Field> {
    vec![
        Field::new("num_postos_pesquisados", DataType::Int64, false),
        Field::new("preco_medio_revenda", DataType::Float64, nullable),
        Field::new("preco_minimo_revenda", DataType::Float64, nullable),
        Field::new("preco_maximo_revenda", DataType::Float64, nullable),
        Field::new("desvio_padrao_revenda", DataType::Float64, nullable),
        Field::new("coef_variacao_revenda", DataType::Float64, nullable),
    ]
}

impl TableRow for MunicipalityFact {
    const TABLE: &'static str = "fato_precos_municipio";

    fn schema() -> Schema {
        let mut fields = vec![
            date_field("data_inicial", false),
            date_field("data_final", false),
            Field::new("ano", DataType::Int32, false),
            key_field("mes_id"),
            key_field("semana"),
            key_field("produto_id"),
            key_field("unidade_id"),
            key_field("pais_id"),
            key_field("regiao_id"),
            key_field("estado_id"),
            key_field("municipio_id"),
            Field::new("is_capital", DataType::UInt8, false),
        ];
        fields.extend(measure_fields(false));
        Schema::new(fields)
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        vec![
            dates(rows.iter().map(|r| Some(r.start_date))),
            dates(rows.iter().map(|r| Some(r.end_date))),
            ints(rows.iter().map(|r| Some(r.year))),
            keys(rows.iter().map(|r| r.month)),
            keys(rows.iter().map(|r| r.week)),
            keys(rows.iter().map(|r| r.product_id)),
            keys(rows.iter().map(|r| r.unit_id)),
            keys(rows.iter().map(|r| r.country_id)),
            keys(rows.iter().map(|r| r.region_id)),
            keys(rows.iter().map(|r| r.state_id)),
            keys(rows.iter().map(|r| r.municipality_id)),
            flags(rows.iter().map(|r| r.is_capital)),
            counts(rows.iter().map(|r| r.stations_surveyed)),
            floats(rows.iter().map(|r| Some(r.mean_price))),
            floats(rows.iter().map(|r| Some(r.min_price))),
            floats(rows.iter().map(|r| Some(r.max_price))),
            floats(rows.iter().map(|r| Some(r.price_std_dev))),
            floats(rows.iter().map(|r| Some(r.price_cv))),
        ]
    }
}

impl<G: Geography> TableRow for AggregateFact<G> {
    const TABLE: &'static str = G::TABLE;

    fn schema() -> Schema {
        let mut fields = key_fields();
        fields.extend(G::fields());
        fields.extend(measure_fields(true));
        Schema::new(fields)
    }

    fn columns(rows: &[Self]) -> Vec<ArrayRef> {
        let geo: Vec<&G> = rows.iter().map(|r| &r.geo).collect();
        let mut cols = vec![
            dates(rows.iter().map(|r| r.key.start_date)),
            dates(rows.iter().map(|r| r.key.end_date)),
            ints(rows.iter().map(|r| r.key.year)),
            nullable_keys(rows.iter().map(|r| r.key.month)),
            nullable_keys(rows.iter().map(|r| r.key.week)),
            nullable_keys(rows.iter().map(|r| r.key.product_id)),
            nullable_keys(rows.iter().map(|r| r.key.unit_id)),
            keys(rows.iter().map(|r| r.key.country_id)),
        ];
        cols.extend(G::columns(&geo));
        cols.extend([
            counts(rows.iter().map(|r| r.measures.stations_surveyed)),
            floats(rows.iter().map(|r| r.measures.mean_price)),
            floats(rows.iter().map(|r| r.measures.min_price)),
            floats(rows.iter().map(|r| r.measures.max_price)),
            floats(rows.iter().map(|r| r.measures.price_std_dev)),
            floats(rows.iter().map(|r| r.measures.price_cv)),
        ]);
        cols
    }
}
