//! Conversions between [`Value`] and the PostgreSQL binary protocol.

use std::error::Error;

use bytes::{BufMut, BytesMut};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::Row;

use crate::core::{Record, Value};

type BoxError = Box<dyn Error + Sync + Send>;

fn mismatch(value: &Value, ty: &Type) -> BoxError {
    format!("cannot encode {} value as PostgreSQL {}", value.type_name(), ty).into()
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    ) || ty.name() == "citext"
}

impl ToSql for Value {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        if self.is_null() {
            return Ok(IsNull::Yes);
        }

        // JSON is sent as text; JSONB carries a leading version byte.
        if *ty == Type::JSON || *ty == Type::JSONB {
            let text = match self {
                Value::Text(s) => s.clone(),
                Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
                other => json_scalar(other),
            };
            if *ty == Type::JSONB {
                out.put_u8(1);
            }
            out.extend_from_slice(text.as_bytes());
            return Ok(IsNull::No);
        }

        if is_text_type(ty) {
            return match self {
                Value::Text(s) => s.as_str().to_sql(ty, out),
                Value::Bytes(b) => String::from_utf8_lossy(b).as_ref().to_sql(ty, out),
                other => other.to_string().as_str().to_sql(ty, out),
            };
        }

        match *ty {
            Type::BOOL => match self.as_bool() {
                Some(b) => b.to_sql(ty, out),
                None => Err(mismatch(self, ty)),
            },
            Type::INT2 => {
                let v = self.as_i64().ok_or_else(|| mismatch(self, ty))?;
                i16::try_from(v)?.to_sql(ty, out)
            }
            Type::INT4 => {
                let v = self.as_i64().ok_or_else(|| mismatch(self, ty))?;
                i32::try_from(v)?.to_sql(ty, out)
            }
            Type::INT8 => {
                let v = self.as_i64().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::FLOAT4 => {
                let v = self.as_f64().ok_or_else(|| mismatch(self, ty))?;
                (v as f32).to_sql(ty, out)
            }
            Type::FLOAT8 => {
                let v = self.as_f64().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::NUMERIC => {
                let v = self.as_decimal().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::DATE => {
                let v = self.as_date().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::TIME => {
                let v = self.as_time().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::TIMESTAMP => {
                let v = self.as_datetime().ok_or_else(|| mismatch(self, ty))?;
                v.to_sql(ty, out)
            }
            Type::TIMESTAMPTZ => {
                let v = self.as_datetime().ok_or_else(|| mismatch(self, ty))?;
                v.and_utc().to_sql(ty, out)
            }
            Type::BYTEA => match self {
                Value::Bytes(b) => b.as_slice().to_sql(ty, out),
                Value::Text(s) => s.as_bytes().to_sql(ty, out),
                _ => Err(mismatch(self, ty)),
            },
            _ => Err(mismatch(self, ty)),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Minimal JSON rendering for scalar values bound to a json column.
fn json_scalar(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Decimal(d) => d.to_string(),
        other => format!("\"{}\"", other.to_string().replace('\\', "\\\\").replace('"', "\\\"")),
    }
}

/// Undecoded column bytes for types without a dedicated mapping.
struct Raw(Vec<u8>);

impl<'a> FromSql<'a> for Raw {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(Raw(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

fn format_uuid(bytes: &[u8]) -> String {
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    if hex.len() != 32 {
        return hex;
    }
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, i: usize) -> Option<Option<T>> {
    row.try_get::<_, Option<T>>(i).ok()
}

/// Decode one column into a [`Value`], choosing the Rust type from the column's type.
pub(crate) fn decode_column(row: &Row, i: usize) -> Value {
    let ty = row.columns()[i].type_().clone();
    let decoded: Option<Value> = match ty {
        Type::BOOL => get::<bool>(row, i).map(|v| v.map(Value::Bool).unwrap_or_default()),
        Type::INT2 => get::<i16>(row, i).map(|v| v.map(|n| Value::Int(n.into())).unwrap_or_default()),
        Type::INT4 => get::<i32>(row, i).map(|v| v.map(|n| Value::Int(n.into())).unwrap_or_default()),
        Type::INT8 => get::<i64>(row, i).map(|v| v.map(Value::Int).unwrap_or_default()),
        Type::FLOAT4 => {
            get::<f32>(row, i).map(|v| v.map(|n| Value::Float(n.into())).unwrap_or_default())
        }
        Type::FLOAT8 => get::<f64>(row, i).map(|v| v.map(Value::Float).unwrap_or_default()),
        Type::NUMERIC => get::<Decimal>(row, i).map(|v| v.map(Value::Decimal).unwrap_or_default()),
        Type::DATE => get::<NaiveDate>(row, i).map(|v| v.map(Value::Date).unwrap_or_default()),
        Type::TIME => get::<NaiveTime>(row, i).map(|v| v.map(Value::Time).unwrap_or_default()),
        Type::TIMESTAMP => {
            get::<NaiveDateTime>(row, i).map(|v| v.map(Value::DateTime).unwrap_or_default())
        }
        Type::TIMESTAMPTZ => get::<chrono::DateTime<chrono::Utc>>(row, i)
            .map(|v| v.map(|d| Value::DateTime(d.naive_utc())).unwrap_or_default()),
        Type::BYTEA => get::<Vec<u8>>(row, i).map(|v| v.map(Value::Bytes).unwrap_or_default()),
        _ => None,
    };
    if let Some(value) = decoded {
        return value;
    }

    match get::<Raw>(row, i) {
        Some(Some(Raw(bytes))) => {
            if ty == Type::UUID {
                Value::Text(format_uuid(&bytes))
            } else if ty == Type::JSONB && bytes.first() == Some(&1) {
                Value::Text(String::from_utf8_lossy(&bytes[1..]).into_owned())
            } else {
                match String::from_utf8(bytes) {
                    Ok(s) => Value::Text(s),
                    Err(e) => Value::Bytes(e.into_bytes()),
                }
            }
        }
        _ => Value::Null,
    }
}

pub(crate) fn row_to_record(row: &Row) -> Record {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), decode_column(row, i)))
        .collect()
}

/// Borrow a slice of values as bind parameters.
pub(crate) fn params(values: &[Value]) -> Vec<&(dyn ToSql + Sync)> {
    values.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
}
