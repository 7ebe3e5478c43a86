//! Column harmonizer: source-native [`RawTable`] to a typed `RecordBatch`.
//!
//! A [`Harmonizer`] is a list of [`ColumnRule`]s, one per output column.
//! Each rule names the source aliases it accepts and the semantic kind of
//! the output. Harmonization is total:
//!
//! - a required rule whose source column is absent fails the whole table
//!   with a data-format error (upstream layout change);
//! - a row whose key cell does not convert, or whose entity is required but
//!   unrecognized, is dropped and counted;
//! - every other cell converts or becomes null.

use std::sync::Arc;

use arrow::array::{
    ArrayRef, BooleanBuilder, Date32Builder, Float64Builder, Int32Builder, Int64Builder,
    RecordBatch, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema, SchemaRef};
use chrono::NaiveDate;

use crate::entity::resolve_entity;
use crate::error::{ImportError, Result};
use crate::raw::{Cell, RawTable, is_null_sentinel};

/// Semantic type of an output column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Identifier: trimmed, upper-cased `Utf8`
    Code,
    /// Free text: trimmed `Utf8`
    Text,
    /// Calendar year as `Int32`
    Year,
    /// `Date32`, parsed with the given chrono format (ISO dates always accepted)
    Date(&'static str),
    /// Measurement as `Float64`; null-sentinel strings become null
    Float,
    Int,
    Bool,
}

impl Kind {
    pub fn data_type(&self) -> DataType {
        match self {
            Kind::Code | Kind::Text => DataType::Utf8,
            Kind::Year => DataType::Int32,
            Kind::Date(_) => DataType::Date32,
            Kind::Float => DataType::Float64,
            Kind::Int => DataType::Int64,
            Kind::Bool => DataType::Boolean,
        }
    }
}

/// One output column and where it comes from.
#[derive(Debug, Clone)]
pub struct ColumnRule {
    pub target: &'static str,
    pub aliases: Vec<&'static str>,
    pub kind: Kind,
    pub required: bool,
    pub key: bool,
    pub constant: Option<String>,
}

impl ColumnRule {
    /// Required, non-key column read from the first alias present.
    pub fn new(target: &'static str, aliases: &[&'static str], kind: Kind) -> Self {
        Self {
            target,
            aliases: aliases.to_vec(),
            kind,
            required: true,
            key: false,
            constant: None,
        }
    }

    /// Column filled with the same text on every row.
    pub fn constant(target: &'static str, value: impl Into<String>) -> Self {
        Self {
            target,
            aliases: Vec::new(),
            kind: Kind::Text,
            required: false,
            key: false,
            constant: Some(value.into()),
        }
    }

    /// Absent source column yields an all-null output column.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Rows where this column does not convert are dropped.
    pub fn key(mut self) -> Self {
        self.required = true;
        self.key = true;
        self
    }

    pub fn field(&self) -> Field {
        Field::new(self.target, self.kind.data_type(), !self.key)
    }
}

/// What to do with rows whose entity does not resolve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityMatch {
    /// Canonicalize recognized countries, keep the rest (aggregates, regions) as-is
    Canonicalize,
    /// Drop rows that do not resolve to a country
    Require,
}

#[derive(Debug, Clone)]
struct EntityStep {
    code: &'static str,
    name: Option<&'static str>,
    mode: EntityMatch,
}

#[derive(Debug, Clone)]
enum Value {
    Null,
    Str(String),
    I32(i32),
    I64(i64),
    F64(f64),
    Bool(bool),
}

enum ColumnBuilder {
    Str(StringBuilder),
    I32(Int32Builder),
    I64(Int64Builder),
    F64(Float64Builder),
    Bool(BooleanBuilder),
    Date(Date32Builder),
}

impl ColumnBuilder {
    fn for_kind(kind: Kind, capacity: usize) -> Self {
        match kind {
            Kind::Code | Kind::Text => Self::Str(StringBuilder::with_capacity(capacity, capacity * 8)),
            Kind::Year => Self::I32(Int32Builder::with_capacity(capacity)),
            Kind::Date(_) => Self::Date(Date32Builder::with_capacity(capacity)),
            Kind::Float => Self::F64(Float64Builder::with_capacity(capacity)),
            Kind::Int => Self::I64(Int64Builder::with_capacity(capacity)),
            Kind::Bool => Self::Bool(BooleanBuilder::with_capacity(capacity)),
        }
    }

    fn append(&mut self, value: Value) {
        match (self, value) {
            (Self::Str(b), Value::Str(s)) => b.append_value(s),
            (Self::I32(b), Value::I32(v)) => b.append_value(v),
            (Self::Date(b), Value::I32(v)) => b.append_value(v),
            (Self::I64(b), Value::I64(v)) => b.append_value(v),
            (Self::F64(b), Value::F64(v)) => b.append_value(v),
            (Self::Bool(b), Value::Bool(v)) => b.append_value(v),
            (Self::Str(b), _) => b.append_null(),
            (Self::I32(b), _) => b.append_null(),
            (Self::Date(b), _) => b.append_null(),
            (Self::I64(b), _) => b.append_null(),
            (Self::F64(b), _) => b.append_null(),
            (Self::Bool(b), _) => b.append_null(),
        }
    }

    fn finish(self) -> ArrayRef {
        match self {
            Self::Str(mut b) => Arc::new(b.finish()),
            Self::I32(mut b) => Arc::new(b.finish()),
            Self::Date(mut b) => Arc::new(b.finish()),
            Self::I64(mut b) => Arc::new(b.finish()),
            Self::F64(mut b) => Arc::new(b.finish()),
            Self::Bool(mut b) => Arc::new(b.finish()),
        }
    }
}

/// 1970-01-01
fn unix_epoch() -> NaiveDate {
    NaiveDate::default()
}

/// Days since 1970-01-01, the `Date32` representation.
pub fn date_to_days(date: NaiveDate) -> i32 {
    (date - unix_epoch()).num_days() as i32
}

/// Inverse of [`date_to_days`].
pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    unix_epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

/// Parse a date with `format`, falling back to an ISO `YYYY-MM-DD` prefix.
pub fn parse_date(s: &str, format: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, format)
        .ok()
        .or_else(|| s.get(..10).and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok()))
}

/// Excel serial day number (1900 date system) to a date.
fn excel_serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    let base = NaiveDate::from_ymd_opt(1899, 12, 30)?;
    base.checked_add_signed(chrono::TimeDelta::try_days(serial.trunc() as i64)?)
}

fn convert(cell: &Cell, kind: Kind) -> Value {
    if let Cell::Text(s) = cell {
        if is_null_sentinel(s) && !matches!(kind, Kind::Text) {
            return Value::Null;
        }
    }
    let converted = match kind {
        Kind::Code => cell.as_str().map(|s| Value::Str(s.to_uppercase())),
        Kind::Text => cell.as_str().map(Value::Str),
        Kind::Year => cell
            .as_i64()
            .or_else(|| match cell {
                Cell::Text(s) => s.trim().get(..4).and_then(|p| p.parse().ok()),
                _ => None,
            })
            .filter(|y| (1000..=9999).contains(y))
            .map(|y| Value::I32(y as i32)),
        Kind::Date(format) => match cell {
            Cell::Text(s) => parse_date(s, format),
            Cell::Number(n) => excel_serial_to_date(*n),
            _ => None,
        }
        .map(|d| Value::I32(date_to_days(d))),
        Kind::Float => cell.as_f64().map(Value::F64),
        Kind::Int => cell.as_i64().map(Value::I64),
        Kind::Bool => cell.as_bool().map(Value::Bool),
    };
    converted.unwrap_or(Value::Null)
}

/// Rule set for one importer's output table.
#[derive(Debug, Clone)]
pub struct Harmonizer {
    provider: &'static str,
    rules: Vec<ColumnRule>,
    entity: Option<EntityStep>,
    schema: SchemaRef,
}

impl Harmonizer {
    pub fn new(provider: &'static str, rules: Vec<ColumnRule>) -> Self {
        let schema = Arc::new(Schema::new(
            rules.iter().map(ColumnRule::field).collect::<Vec<_>>(),
        ));
        Self {
            provider,
            rules,
            entity: None,
            schema,
        }
    }

    /// Route the `code` (and optional `name`) output columns through
    /// [`resolve_entity`].
    pub fn resolve_entities(
        mut self,
        code: &'static str,
        name: Option<&'static str>,
        mode: EntityMatch,
    ) -> Self {
        self.entity = Some(EntityStep { code, name, mode });
        self
    }

    pub fn schema(&self) -> SchemaRef {
        self.schema.clone()
    }

    pub fn provider(&self) -> &'static str {
        self.provider
    }

    fn position(&self, target: &str) -> Option<usize> {
        self.rules.iter().position(|r| r.target == target)
    }

    /// Locate each rule's source column; `None` means "fill with null/constant".
    fn bind(&self, raw: &RawTable) -> Result<Vec<Option<usize>>> {
        let mut bound = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let idx = rule.aliases.iter().find_map(|a| raw.column_index(a));
            if idx.is_none() && rule.required {
                return Err(ImportError::format(
                    self.provider,
                    format!(
                        "missing column for '{}' (expected one of {:?}, found {:?})",
                        rule.target,
                        rule.aliases,
                        raw.columns()
                    ),
                ));
            }
            bound.push(idx);
        }
        Ok(bound)
    }

    fn apply_entity(&self, step: &EntityStep, values: &mut [Value]) -> bool {
        let code_pos = self.position(step.code);
        let name_pos = step.name.and_then(|n| self.position(n));
        let text = |pos: Option<usize>, values: &[Value]| match pos.map(|p| &values[p]) {
            Some(Value::Str(s)) if !is_null_sentinel(s) => Some(s.clone()),
            _ => None,
        };

        let resolved = text(code_pos, values)
            .and_then(|c| resolve_entity(&c))
            .or_else(|| text(name_pos, values).and_then(|n| resolve_entity(&n)));

        match resolved {
            Some(entity) => {
                if let Some(p) = code_pos {
                    values[p] = Value::Str(entity.code.to_string());
                }
                if let Some(p) = name_pos {
                    values[p] = Value::Str(entity.name.to_string());
                }
                true
            }
            None => step.mode == EntityMatch::Canonicalize,
        }
    }

    /// Convert a raw table. Output columns follow the rule order exactly.
    pub fn apply(&self, raw: &RawTable) -> Result<RecordBatch> {
        let bound = self.bind(raw)?;
        let mut builders: Vec<ColumnBuilder> = self
            .rules
            .iter()
            .map(|r| ColumnBuilder::for_kind(r.kind, raw.num_rows()))
            .collect();

        let mut dropped_key = 0usize;
        let mut dropped_entity = 0usize;
        for row in raw.rows() {
            let mut values: Vec<Value> = self
                .rules
                .iter()
                .zip(&bound)
                .map(|(rule, idx)| match (idx, &rule.constant) {
                    (_, Some(c)) => Value::Str(c.clone()),
                    (Some(i), None) => convert(&row[*i], rule.kind),
                    (None, None) => Value::Null,
                })
                .collect();

            if let Some(step) = &self.entity {
                if !self.apply_entity(step, &mut values) {
                    dropped_entity += 1;
                    continue;
                }
            }
            let missing_key = self
                .rules
                .iter()
                .zip(&values)
                .any(|(rule, v)| rule.key && matches!(v, Value::Null));
            if missing_key {
                dropped_key += 1;
                continue;
            }

            for (builder, value) in builders.iter_mut().zip(values) {
                builder.append(value);
            }
        }

        if dropped_key + dropped_entity > 0 {
            log::debug!(
                "{}: dropped {dropped_key} rows with missing keys, {dropped_entity} with unrecognized entities",
                self.provider
            );
        }

        let columns: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
        Ok(RecordBatch::try_new(self.schema.clone(), columns)?)
    }
}
