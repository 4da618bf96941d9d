use std::fmt;

use crate::error::SqlReconnectError;
use crate::types::{DatabaseType, RowValues};

use super::{ValueCodec, conversion_failed, text_of};

/// A latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    #[must_use]
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6},{:.6})", self.latitude, self.longitude)
    }
}

/// Points as text: `POINT(lat lon)` for `MySQL` (read through `AsText`), `(lat,lon)`
/// elsewhere.
#[derive(Debug, Clone, Copy)]
pub struct PointCodec {
    db_type: DatabaseType,
}

impl PointCodec {
    #[must_use]
    pub fn new(db_type: DatabaseType) -> Self {
        Self { db_type }
    }

    /// Wrap a placeholder or column so the engine converts to and from the text form.
    #[must_use]
    pub fn wrap_bind_sql(&self, expr: &str) -> String {
        match self.db_type {
            DatabaseType::Mysql => format!("PointFromText({expr})"),
            _ => expr.to_string(),
        }
    }

    #[must_use]
    pub fn wrap_select_sql(&self, expr: &str) -> String {
        match self.db_type {
            DatabaseType::Mysql => format!("AsText({expr})"),
            _ => expr.to_string(),
        }
    }

    fn parse(&self, text: &str) -> Option<Point> {
        let text = text.trim();
        let (inner, separator) = match self.db_type {
            DatabaseType::Mysql => (
                text.strip_prefix("POINT(")
                    .or_else(|| text.strip_prefix("point("))?
                    .strip_suffix(')')?,
                ' ',
            ),
            _ => (text.strip_prefix('(')?.strip_suffix(')')?, ','),
        };
        let mut parts = inner
            .split(separator)
            .map(str::trim)
            .filter(|p| !p.is_empty());
        let latitude = parts.next()?.parse().ok()?;
        let longitude = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Point::new(latitude, longitude))
    }
}

impl ValueCodec for PointCodec {
    type Value = Point;

    fn name(&self) -> &str {
        "point"
    }

    fn decode(&self, raw: &RowValues) -> Result<Point, SqlReconnectError> {
        let text = text_of(raw, self.name())?;
        self.parse(text)
            .ok_or_else(|| conversion_failed(raw, self.name()))
    }

    fn encode(&self, value: &Point) -> Result<RowValues, SqlReconnectError> {
        let text = match self.db_type {
            DatabaseType::Mysql => format!("POINT({:.6} {:.6})", value.latitude, value.longitude),
            _ => format!("({:.6}, {:.6})", value.latitude, value.longitude),
        };
        Ok(RowValues::Text(text))
    }
}
