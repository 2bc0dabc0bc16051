//! Domain records shared by every storage backend

pub mod credentials;
pub mod validation;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

pub use credentials::PasswordHash;

// ============================================================================
// Identifiers and quantities
// ============================================================================

/// Record identifier: numeric for local/relational rows, a generated string
/// for document-store rows. Two ids are equal when their text forms match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Number(i64),
    Text(String),
}

impl EntityId {
    /// Parse a path segment, preferring the numeric form
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        raw.parse::<i64>()
            .map(EntityId::Number)
            .unwrap_or_else(|_| EntityId::Text(raw.to_string()))
    }

    pub fn as_number(&self) -> Option<i64> {
        match self {
            EntityId::Number(n) => Some(*n),
            EntityId::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityId::Number(n) => write!(f, "{}", n),
            EntityId::Text(s) => f.write_str(s),
        }
    }
}

impl PartialEq for EntityId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (EntityId::Number(a), EntityId::Number(b)) => a == b,
            (EntityId::Text(a), EntityId::Text(b)) => a == b,
            _ => self.to_string() == other.to_string(),
        }
    }
}

impl Eq for EntityId {}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        EntityId::Number(n)
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        EntityId::Text(s)
    }
}

/// Coerce a loosely typed quantity: numbers truncate, numeric strings parse,
/// everything else is zero. Negative values clamp to zero.
pub fn coerce_quantity(value: &Value) -> i64 {
    let n = match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64))
            .unwrap_or(0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
            .unwrap_or(0),
        _ => 0,
    };
    n.max(0)
}

fn lenient_quantity<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_quantity(&value))
}

/// Patient age as typed on the intake form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Age {
    /// Not given
    #[default]
    Blank,
    Years(i64),
    /// Filled in with something that is not a number
    Unreadable,
}

impl Age {
    pub fn years(self) -> Option<i64> {
        match self {
            Age::Years(n) => Some(n),
            Age::Blank | Age::Unreadable => None,
        }
    }
}

impl From<Option<i64>> for Age {
    fn from(years: Option<i64>) -> Self {
        years.map(Age::Years).unwrap_or_default()
    }
}

impl Serialize for Age {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.years() {
            Some(n) => serializer.serialize_i64(n),
            None => serializer.serialize_none(),
        }
    }
}

/// Ages arrive as numbers or form strings; blanks mean "not given"
impl<'de> Deserialize<'de> for Age {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let number = |f: f64| {
            if f.is_finite() {
                Age::Years(f.trunc() as i64)
            } else {
                Age::Unreadable
            }
        };
        Ok(match value {
            Value::Null => Age::Blank,
            Value::Number(n) => match n.as_i64() {
                Some(i) => Age::Years(i),
                None => n.as_f64().map(number).unwrap_or(Age::Unreadable),
            },
            Value::String(s) if s.trim().is_empty() => Age::Blank,
            Value::String(s) => s.trim().parse::<f64>().map(number).unwrap_or(Age::Unreadable),
            _ => Age::Unreadable,
        })
    }
}

// ============================================================================
// Supplies (insumos)
// ============================================================================

/// Medical supply tracked by name and quantity on hand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Supply {
    pub id: EntityId,
    #[serde(default)]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub cantidad: i64,
}

/// Body of a supply create or edit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyInput {
    #[serde(default)]
    pub nombre: String,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub cantidad: i64,
}

impl SupplyInput {
    pub fn new(nombre: impl Into<String>, cantidad: i64) -> Self {
        Self {
            nombre: nombre.into(),
            cantidad: cantidad.max(0),
        }
    }
}

/// One supply consumed during a visit, or one entry of a decrement batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupplyUsage {
    pub id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nombre: Option<String>,
    #[serde(default, deserialize_with = "lenient_quantity")]
    pub cantidad: i64,
}

impl SupplyUsage {
    pub fn new(id: impl Into<EntityId>, cantidad: i64) -> Self {
        Self {
            id: id.into(),
            nombre: None,
            cantidad: cantidad.max(0),
        }
    }
}

/// Quantity left after consuming `requested` units; never negative
pub fn decremented(current: i64, requested: i64) -> i64 {
    current.saturating_sub(requested).max(0)
}

/// Apply a decrement batch in place. Unknown ids are skipped.
pub fn apply_usage(supplies: &mut [Supply], usages: &[SupplyUsage]) {
    for usage in usages {
        if let Some(supply) = supplies.iter_mut().find(|s| s.id == usage.id) {
            supply.cantidad = decremented(supply.cantidad, usage.cantidad);
        }
    }
}

/// Stock the clinic starts with; also the baseline for low-stock alerts
pub fn default_supplies() -> Vec<Supply> {
    vec![
        Supply {
            id: EntityId::Number(1),
            nombre: "Guantes".to_string(),
            cantidad: 20,
        },
        Supply {
            id: EntityId::Number(2),
            nombre: "Jeringas".to_string(),
            cantidad: 15,
        },
        Supply {
            id: EntityId::Number(3),
            nombre: "Alcohol".to_string(),
            cantidad: 10,
        },
    ]
}

// ============================================================================
// Visits (consultas)
// ============================================================================

/// One set of vital-sign readings; every field is free text
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VitalSigns {
    pub presion: String,
    pub fc: String,
    pub fr: String,
    pub temp: String,
    pub glicemia: String,
    pub dolor: String,
    pub glasgow: String,
}

/// Visit fields as submitted by the intake form
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisitDraft {
    pub nombre: String,
    pub edad: Age,
    pub rut: String,
    pub carrera: String,
    pub telefono: String,
    pub motivo: String,
    pub tratamiento: String,
    pub fecha: String,
    pub hora: String,
    pub usuario: String,
    pub vitales: Vec<VitalSigns>,
    pub insumos: Vec<SupplyUsage>,
    /// Student insurance (DIAE) applies to this visit
    pub diae: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub imagen: Option<String>,
}

/// A stored clinical visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
    pub id: EntityId,
    #[serde(flatten)]
    pub details: VisitDraft,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// Substring filters over the visit list; empty fields match everything
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VisitFilter {
    pub rut: Option<String>,
    pub fecha: Option<String>,
    pub carrera: Option<String>,
    pub motivo: Option<String>,
}

fn contains_ci(field: &str, query: Option<&str>) -> bool {
    match query.map(str::trim) {
        None | Some("") => true,
        Some(q) => field.to_lowercase().contains(&q.to_lowercase()),
    }
}

impl VisitFilter {
    pub fn matches(&self, visit: &Visit) -> bool {
        let v = &visit.details;
        contains_ci(&v.rut, self.rut.as_deref())
            && contains_ci(&v.fecha, self.fecha.as_deref())
            && contains_ci(&v.carrera, self.carrera.as_deref())
            && contains_ci(&v.motivo, self.motivo.as_deref())
    }

    pub fn apply(&self, visits: Vec<Visit>) -> Vec<Visit> {
        visits.into_iter().filter(|v| self.matches(v)).collect()
    }
}

/// Headline numbers for the charts page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VisitStats {
    pub total_pacientes: usize,
    pub total_seguros: usize,
    pub carreras: Vec<String>,
}

impl VisitStats {
    pub fn from_visits(visits: &[Visit]) -> Self {
        let mut carreras: Vec<String> = Vec::new();
        for visit in visits {
            let carrera = visit.details.carrera.trim();
            if !carrera.is_empty() && !carreras.iter().any(|c| c == carrera) {
                carreras.push(carrera.to_string());
            }
        }

        Self {
            total_pacientes: visits.len(),
            total_seguros: visits.iter().filter(|v| v.details.diae).count(),
            carreras,
        }
    }
}

// ============================================================================
// Accounts (cuentas)
// ============================================================================

/// Staff account metadata; never carries credentials
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub usuario: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub rut: String,
    #[serde(default)]
    pub cargo: String,
    /// Creation timestamp as displayed to staff
    #[serde(default)]
    pub fecha: String,
    /// Auth-provider user id (document-store mode)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

impl Account {
    /// The seeded administrator, matched by its seeded id or its user name
    pub fn is_admin(&self) -> bool {
        self.id == ADMIN_ID || self.usuario == ADMIN_USER
    }
}

/// Account row as persisted by the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAccount {
    #[serde(flatten)]
    pub account: Account,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<PasswordHash>,
}

/// Body of an account creation
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NewAccount {
    pub usuario: String,
    pub email: String,
    pub rut: String,
    pub cargo: String,
    pub password: String,
}

/// Partial account edit; absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AccountUpdate {
    pub usuario: Option<String>,
    pub email: Option<String>,
    pub rut: Option<String>,
    pub cargo: Option<String>,
    pub password: Option<String>,
}

/// Name of the seeded administrator account
pub const ADMIN_USER: &str = "admin";
/// Id the administrator is seeded with in local mode
pub const ADMIN_ID: &str = "1";
/// Mail domain assumed for bare user names
pub const STAFF_MAIL_DOMAIN: &str = "sigep.cl";

/// Accounts a fresh installation starts with
pub fn default_accounts(fecha: &str) -> Vec<StoredAccount> {
    vec![StoredAccount {
        account: Account {
            id: ADMIN_ID.to_string(),
            usuario: ADMIN_USER.to_string(),
            email: format!("{}@{}", ADMIN_USER, STAFF_MAIL_DOMAIN),
            rut: "11111111-1".to_string(),
            cargo: "Administrador".to_string(),
            fecha: fecha.to_string(),
            uid: None,
        },
        password: Some(PasswordHash::new(ADMIN_USER)),
    }]
}

/// Login name to auth-provider email: emails pass through, bare names get the staff domain
pub fn login_email(user_or_email: &str) -> String {
    let user = user_or_email.trim();
    if user.contains('@') {
        user.to_string()
    } else {
        format!("{}@{}", user, STAFF_MAIL_DOMAIN)
    }
}
