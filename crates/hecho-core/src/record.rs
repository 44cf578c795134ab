//! Typed records decoded from the open-data portal's JSON rows.
//!
//! SODA returns flat JSON objects whose values are mostly strings, even for
//! numeric columns. Every row goes through [`FromSourceRow`] right after the
//! page is parsed, so coercion rules live in exactly one place.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result, dataset::DatasetKind};

/// A single untyped row as returned by the source API.
pub type SourceRow = serde_json::Map<String, Value>;

/// Source column holding the incident occurrence date.
pub const OCCURRED_ON_FIELD: &str = "fecha_hecho";

/// SODA system field carrying the portal's stable row identifier.
pub const SOURCE_ROW_ID_FIELD: &str = ":id";

/// Tag written to the `provenance` column of every raw row.
pub const PROVENANCE: &str = "datos_abiertos_api";

// ─── Decoding trait ──────────────────────────────────────────────────────────

/// A record type that can be decoded from a raw source row.
pub trait FromSourceRow: Sized {
  /// The dataset this record type is fetched from.
  const DATASET: DatasetKind;

  /// Source field used to give pagination a stable order.
  const ORDER_FIELD: &'static str;

  /// Columns to request; `None` lets the source return its default set.
  const SELECT: Option<&'static str> = None;

  fn from_source_row(row: &SourceRow) -> Result<Self>;
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// One aggregated incident row (a group of victims sharing date, place, zone
/// and sex).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentRecord {
  /// The portal's row identifier, when the source exposes one.
  pub source_row_id:     Option<String>,
  pub occurred_on:       NaiveDate,
  pub department_code:   Option<i64>,
  pub department_name:   Option<String>,
  pub municipality_code: Option<i64>,
  pub municipality_name: Option<String>,
  /// Urban/rural zone label as published.
  pub zone:              Option<String>,
  /// Free-text sex category as published.
  pub sex:               Option<String>,
  /// Number of victims; 1 when the source omits it.
  pub victims:           i64,
}

/// A DIVIPOLA department catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepartmentRecord {
  pub code:      i64,
  pub name:      Option<String>,
  pub latitude:  Option<f64>,
  pub longitude: Option<f64>,
  /// The published geometry, kept verbatim as JSON text.
  pub geometry:  Option<String>,
}

/// A DIVIPOLA municipality catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MunicipalityRecord {
  pub code:            i64,
  pub department_code: Option<i64>,
  pub department_name: Option<String>,
  pub name:            Option<String>,
  /// Municipality kind, e.g. "Municipio" or "Isla".
  pub kind:            Option<String>,
  pub latitude:        Option<f64>,
  pub longitude:       Option<f64>,
  pub geometry:        Option<String>,
}

impl FromSourceRow for IncidentRecord {
  const DATASET: DatasetKind = DatasetKind::Incidents;
  const ORDER_FIELD: &'static str = OCCURRED_ON_FIELD;
  // System fields such as `:id` are only returned when asked for.
  const SELECT: Option<&'static str> = Some(":*, *");

  fn from_source_row(row: &SourceRow) -> Result<Self> {
    let f = Fields::new(Self::DATASET, row);
    Ok(Self {
      source_row_id:     f.text(SOURCE_ROW_ID_FIELD),
      occurred_on:       f.required(OCCURRED_ON_FIELD, f.date(OCCURRED_ON_FIELD)?)?,
      department_code:   f.int("cod_depto")?,
      department_name:   f.text("departamento"),
      municipality_code: f.int("cod_muni")?,
      municipality_name: f.text("municipio"),
      zone:              f.text("zona"),
      sex:               f.text("sexo"),
      victims:           f.int("cantidad")?.unwrap_or(1),
    })
  }
}

impl FromSourceRow for DepartmentRecord {
  const DATASET: DatasetKind = DatasetKind::Departments;
  const ORDER_FIELD: &'static str = "cod_dpto";

  fn from_source_row(row: &SourceRow) -> Result<Self> {
    let f = Fields::new(Self::DATASET, row);
    Ok(Self {
      code:      f.required("cod_dpto", f.int("cod_dpto")?)?,
      name:      f.text("nom_dpto"),
      latitude:  f.float("latitud")?,
      longitude: f.float("longitud")?,
      geometry:  f.text("geo_departamento"),
    })
  }
}

impl FromSourceRow for MunicipalityRecord {
  const DATASET: DatasetKind = DatasetKind::Municipalities;
  const ORDER_FIELD: &'static str = "cod_mpio";

  fn from_source_row(row: &SourceRow) -> Result<Self> {
    let f = Fields::new(Self::DATASET, row);
    Ok(Self {
      code:            f.required("cod_mpio", f.int("cod_mpio")?)?,
      department_code: f.int("cod_dpto")?,
      department_name: f.text("nom_dpto"),
      name:            f.text("nom_mpio"),
      kind:            f.text("tipo"),
      latitude:        f.float("latitud")?,
      longitude:       f.float("longitud")?,
      geometry:        f.text("geo_municipio"),
    })
  }
}

// ─── Field coercion ──────────────────────────────────────────────────────────

/// Borrowed view over a source row with coercing accessors.
///
/// Missing keys, JSON nulls and empty strings all read as `None`.
struct Fields<'a> {
  dataset: DatasetKind,
  row:     &'a SourceRow,
}

impl<'a> Fields<'a> {
  fn new(dataset: DatasetKind, row: &'a SourceRow) -> Self { Self { dataset, row } }

  fn value(&self, field: &str) -> Option<&'a Value> {
    match self.row.get(field) {
      None | Some(Value::Null) => None,
      Some(Value::String(s)) if s.trim().is_empty() => None,
      Some(v) => Some(v),
    }
  }

  fn invalid(&self, field: &'static str, reason: impl Into<String>) -> Error {
    Error::InvalidRecord { dataset: self.dataset, field, reason: reason.into() }
  }

  fn required<T>(&self, field: &'static str, value: Option<T>) -> Result<T> {
    value.ok_or_else(|| self.invalid(field, "is missing"))
  }

  fn text(&self, field: &str) -> Option<String> {
    self.value(field).map(|v| match v {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    })
  }

  fn int(&self, field: &'static str) -> Result<Option<i64>> {
    let Some(v) = self.value(field) else { return Ok(None) };
    let parsed = match v {
      Value::Number(n) => n.as_i64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    };
    parsed
      .map(Some)
      .ok_or_else(|| self.invalid(field, format!("is not an integer: {v}")))
  }

  fn float(&self, field: &'static str) -> Result<Option<f64>> {
    let Some(v) = self.value(field) else { return Ok(None) };
    let parsed = match v {
      Value::Number(n) => n.as_f64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    };
    parsed
      .map(Some)
      .ok_or_else(|| self.invalid(field, format!("is not a number: {v}")))
  }

  /// Accepts `YYYY-MM-DD` or a SODA floating timestamp
  /// (`YYYY-MM-DDTHH:MM:SS.fff`); the time part is discarded.
  fn date(&self, field: &'static str) -> Result<Option<NaiveDate>> {
    let Some(v) = self.value(field) else { return Ok(None) };
    let Value::String(s) = v else {
      return Err(self.invalid(field, format!("is not a date string: {v}")));
    };
    s.trim()
      .get(..10)
      .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
      .map(Some)
      .ok_or_else(|| self.invalid(field, format!("is not a date: {s:?}")))
  }
}
