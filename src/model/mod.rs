// src/model/mod.rs
//
// Star schema built from normalized records: eight dimensions keyed by first
// appearance, four fact grains resolved against them. Nothing in here touches
// the filesystem.

pub mod dimensions;
pub mod facts;
pub mod keys;

pub use dimensions::{
    CountryRow, DimensionSet, MonthRow, MunicipalityRow, ProductRow, RegionRow, StateRow,
    TimePeriodRow, UnitRow,
};
pub use facts::{
    AggregateFact, CountryFact, DimensionIndex, FactKey, FactSet, Measures, MunicipalityFact,
    RegionFact, StateFact,
};
