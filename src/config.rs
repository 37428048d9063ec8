// src/config.rs

use anyhow::{Context, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashSet},
    env, fs,
    path::{Path, PathBuf},
};

use crate::normalize::text::{fold_text, strip_diacritics};

/// Raw header variants seen across the weekly files, mapped to canonical names.
static DEFAULT_COLUMN_RENAMES: &[(&str, &str)] = &[
    ("DATA INICIAL", "data_inicial"),
    ("DATA FINAL", "data_final"),
    ("BRASIL", "pais"),
    ("PAIS", "pais"),
    ("PAÍS", "pais"),
    ("ESTADO", "estado"),
    ("ESTADOS", "estado"),
    ("MUNICÍPIO", "municipio"),
    ("MUNICIPIO", "municipio"),
    ("REGIAO", "regiao"),
    ("REGIÃO", "regiao"),
    ("PRODUTO", "produto"),
    ("NÚMERO DE POSTOS PESQUISADOS", "num_postos_pesquisados"),
    ("NUMERO DE POSTOS PESQUISADOS", "num_postos_pesquisados"),
    ("UNIDADE DE MEDIDA", "unidade_medida"),
    ("PREÇO MÉDIO REVENDA", "preco_medio_revenda"),
    ("PRECO MEDIO REVENDA", "preco_medio_revenda"),
    ("DESVIO PADRÃO REVENDA", "desvio_padrao_revenda"),
    ("DESVIO PADRAO REVENDA", "desvio_padrao_revenda"),
    ("PREÇO MÍNIMO REVENDA", "preco_minimo_revenda"),
    ("PRECO MINIMO REVENDA", "preco_minimo_revenda"),
    ("PREÇO MÁXIMO REVENDA", "preco_maximo_revenda"),
    ("PRECO MAXIMO REVENDA", "preco_maximo_revenda"),
    ("COEF DE VARIAÇÃO REVENDA", "coef_variacao_revenda"),
    ("COEF DE VARIACAO REVENDA", "coef_variacao_revenda"),
];

/// The 27 state capitals, uppercase and unaccented.
static DEFAULT_CAPITALS: &[&str] = &[
    "RIO BRANCO",
    "MACEIO",
    "MACAPA",
    "MANAUS",
    "SALVADOR",
    "FORTALEZA",
    "BRASILIA",
    "VITORIA",
    "GOIANIA",
    "SAO LUIS",
    "CUIABA",
    "CAMPO GRANDE",
    "BELO HORIZONTE",
    "BELEM",
    "JOAO PESSOA",
    "CURITIBA",
    "RECIFE",
    "TERESINA",
    "RIO DE JANEIRO",
    "NATAL",
    "PORTO ALEGRE",
    "PORTO VELHO",
    "BOA VISTA",
    "FLORIANOPOLIS",
    "SAO PAULO",
    "ARACAJU",
    "PALMAS",
];

const DEFAULT_BASE_URL: &str =
    "https://www.gov.br/anp/pt-br/assuntos/precos-e-defesa-da-concorrencia/precos/arquivos-lpc/";

/// Top-level settings for one pipeline run. Every field has a default, so an
/// empty (or absent) YAML file is a valid configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub year: i32,
    pub data_dir: PathBuf,
    pub fetch: FetchConfig,
    pub convert: ConvertConfig,
    pub output: OutputConfig,
    pub columns: ColumnRenames,
    pub capitals: CapitalCities,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub enabled: bool,
    pub base_url: String,
    pub first_week_start: NaiveDate,
    pub max_retries: usize,
    pub retry_delay_ms: u64,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertConfig {
    pub enabled: bool,
    pub sheet: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Also write a Snappy-compressed Parquet copy of every output table.
    pub parquet: bool,
}

/// Header lookup table. Keys are folded (diacritics stripped, trimmed,
/// upper-cased) on construction so lookups only need the folded header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ColumnRenames {
    map: BTreeMap<String, String>,
}

impl ColumnRenames {
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let map = entries
            .into_iter()
            .map(|(k, v)| (fold_text(k.as_ref()), v.into()))
            .collect();
        Self { map }
    }

    /// Canonical name for an already-folded header, if the table knows it.
    pub fn lookup(&self, folded_header: &str) -> Option<&str> {
        self.map.get(folded_header).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

impl Default for ColumnRenames {
    fn default() -> Self {
        Self::new(DEFAULT_COLUMN_RENAMES.iter().copied())
    }
}

impl From<BTreeMap<String, String>> for ColumnRenames {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self::new(map)
    }
}

impl From<ColumnRenames> for BTreeMap<String, String> {
    fn from(renames: ColumnRenames) -> Self {
        renames.map
    }
}

/// Municipality names flagged as state capitals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<String>", into = "Vec<String>")]
pub struct CapitalCities {
    names: HashSet<String>,
}

impl CapitalCities {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        // Stored the way municipality values look after normalization.
        let names = names
            .into_iter()
            .map(|n| strip_diacritics(n.as_ref()).trim().to_uppercase())
            .collect();
        Self { names }
    }

    /// Exact match against an already-normalized municipality name.
    pub fn contains(&self, municipality: &str) -> bool {
        self.names.contains(municipality)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for CapitalCities {
    fn default() -> Self {
        Self::new(DEFAULT_CAPITALS.iter().copied())
    }
}

impl From<Vec<String>> for CapitalCities {
    fn from(names: Vec<String>) -> Self {
        Self::new(names)
    }
}

impl From<CapitalCities> for Vec<String> {
    fn from(capitals: CapitalCities) -> Self {
        let mut names: Vec<String> = capitals.names.into_iter().collect();
        names.sort();
        names
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            year: Local::now().year(),
            data_dir: PathBuf::from("data"),
            fetch: FetchConfig::default(),
            convert: ConvertConfig::default(),
            output: OutputConfig::default(),
            columns: ColumnRenames::default(),
            capitals: CapitalCities::default(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: DEFAULT_BASE_URL.to_string(),
            first_week_start: NaiveDate::from_ymd_opt(2025, 1, 5).unwrap_or_default(),
            max_retries: 3,
            retry_delay_ms: 1_000,
            timeout_secs: 60,
        }
    }
}

impl Default for ConvertConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sheet: "MUNICIPIOS".to_string(),
        }
    }
}

impl PipelineConfig {
    /// Load from an optional YAML file, then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let text = fs::read_to_string(p)
                    .with_context(|| format!("reading config {}", p.display()))?;
                Self::from_yaml(&text).with_context(|| format!("parsing config {}", p.display()))?
            }
            None => Self::default(),
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_yaml(text: &str) -> Result<Self> {
        // serde_yaml rejects an empty document for a struct; treat it as defaults.
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(year) = env::var("FUELPRICES_YEAR") {
            self.year = year
                .trim()
                .parse()
                .with_context(|| format!("FUELPRICES_YEAR is not a year: {year:?}"))?;
        }
        if let Ok(dir) = env::var("FUELPRICES_DATA_DIR") {
            self.data_dir = PathBuf::from(dir);
        }
        Ok(())
    }
}
