use regdesk_common::{
    AcademicLevel, Choice, Error, HowHeard, IasCourse, NewRegistration, Registration, Result,
    UserType,
};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use crate::connection::{Connection, Connector, Row};
use crate::dialect::quote_ident;
use crate::endpoint::{BackendKind, Endpoint};
use crate::schema::REGISTRATION_TABLE;

const COLUMNS: [&str; 11] = [
    "id",
    "first_name",
    "middle_name",
    "last_name",
    "university_id",
    "phone",
    "email",
    "user_type",
    "academic_level",
    "how_heard",
    "ias_course",
];

/// Persistent storage for submitted registrations.
pub struct RegistrationStore {
    conn: Mutex<Box<dyn Connection>>,
}

impl RegistrationStore {
    pub async fn connect(connector: &dyn Connector, endpoint: &Endpoint) -> Result<Self> {
        info!("opening registration store at {endpoint}");
        Ok(Self::new(connector.connect(endpoint).await?))
    }

    pub fn new(conn: Box<dyn Connection>) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    async fn connection(&self) -> MutexGuard<'_, Box<dyn Connection>> {
        self.conn.lock().await
    }

    pub async fn insert(&self, new: NewRegistration) -> Result<Registration> {
        let mut conn = self.connection().await;
        let sql = insert_sql(conn.backend());

        let params = [
            Some(new.first_name.as_str()),
            new.middle_name.as_deref(),
            Some(new.last_name.as_str()),
            new.university_id.as_deref(),
            Some(new.phone.as_str()),
            new.email.as_deref(),
            Some(new.user_type.label()),
            Some(new.academic_level.label()),
            Some(new.how_heard.label()),
            new.ias_course.map(|c| c.label()),
        ];
        let rows = conn
            .query(&sql, &params)
            .await
            .map_err(|e| Error::Database(format!("failed to insert registration: {e}")))?;

        let id = rows
            .first()
            .and_then(|row| row.first().cloned().flatten())
            .ok_or_else(|| Error::Database("insert returned no id".into()))
            .and_then(|raw| parse_id(&raw))?;
        debug!("stored registration {id}");
        Ok(Registration::from_new(id, new))
    }

    /// All registrations, oldest first.
    pub async fn list(&self) -> Result<Vec<Registration>> {
        let mut conn = self.connection().await;
        let select = COLUMNS
            .iter()
            .map(|c| format!("CAST({0} AS TEXT)", quote_ident(c)))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {select} FROM {} ORDER BY {}",
            quote_ident(REGISTRATION_TABLE),
            quote_ident("id")
        );

        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::Database(format!("failed to list registrations: {e}")))?;
        rows.into_iter().map(row_to_registration).collect()
    }

    pub async fn count(&self) -> Result<u64> {
        let mut conn = self.connection().await;
        let sql = format!(
            "SELECT CAST(COUNT(*) AS TEXT) FROM {}",
            quote_ident(REGISTRATION_TABLE)
        );
        let rows = conn
            .query(&sql, &[])
            .await
            .map_err(|e| Error::Database(format!("failed to count registrations: {e}")))?;

        rows.first()
            .and_then(|row| row.first().cloned().flatten())
            .ok_or_else(|| Error::Database("count returned no rows".into()))?
            .parse()
            .map_err(|e| Error::Database(format!("invalid count: {e}")))
    }
}

fn insert_sql(backend: BackendKind) -> String {
    let columns = COLUMNS[1..]
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let values = [
        backend.placeholder(1),
        backend.placeholder(2),
        backend.placeholder(3),
        backend.placeholder(4),
        backend.placeholder(5),
        backend.placeholder(6),
        backend.choice_placeholder(7, UserType::TYPE_NAME),
        backend.choice_placeholder(8, AcademicLevel::TYPE_NAME),
        backend.choice_placeholder(9, HowHeard::TYPE_NAME),
        backend.choice_placeholder(10, IasCourse::TYPE_NAME),
    ]
    .join(", ");

    format!(
        "INSERT INTO {} ({columns}) VALUES ({values}) RETURNING CAST({} AS TEXT)",
        quote_ident(REGISTRATION_TABLE),
        quote_ident("id")
    )
}

fn parse_id(raw: &str) -> Result<i64> {
    raw.parse()
        .map_err(|e| Error::Database(format!("invalid registration id '{raw}': {e}")))
}

fn row_to_registration(row: Row) -> Result<Registration> {
    let mut cells = row.into_iter();
    let mut next = || cells.next().flatten();

    let id = parse_id(&required("id", next())?)?;
    let first_name = required("first_name", next())?;
    let middle_name = next();
    let last_name = required("last_name", next())?;
    let university_id = next();
    let phone = required("phone", next())?;
    let email = next();
    let user_type = choice::<UserType>(&required("user_type", next())?)?;
    let academic_level = choice::<AcademicLevel>(&required("academic_level", next())?)?;
    let how_heard = choice::<HowHeard>(&required("how_heard", next())?)?;
    let ias_course = next().map(|v| choice::<IasCourse>(&v)).transpose()?;

    Ok(Registration {
        id,
        first_name,
        middle_name,
        last_name,
        university_id,
        phone,
        email,
        user_type,
        academic_level,
        how_heard,
        ias_course,
    })
}

fn required(column: &str, value: Option<String>) -> Result<String> {
    value.ok_or_else(|| Error::Database(format!("column {column} is unexpectedly NULL")))
}

fn choice<C: Choice>(value: &str) -> Result<C> {
    C::parse_label(value).map_err(|e| Error::Database(format!("stored value rejected: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::NativeConnector;
    use crate::migrator::Migrator;

    async fn store(dir: &tempfile::TempDir) -> RegistrationStore {
        let endpoint = Endpoint::sqlite_file(dir.path().join("forms.db"));
        Migrator::registered()
            .upgrade_to_head(&NativeConnector, &endpoint)
            .await
            .unwrap();
        RegistrationStore::connect(&NativeConnector, &endpoint)
            .await
            .unwrap()
    }

    fn sample(first_name: &str) -> NewRegistration {
        NewRegistration {
            first_name: first_name.into(),
            middle_name: None,
            last_name: "العتيبي".into(),
            university_id: Some("201912345".into()),
            phone: "+966 50 123 4567".into(),
            email: None,
            user_type: UserType::Student,
            academic_level: AcademicLevel::ALL[0],
            how_heard: HowHeard::ALL[0],
            ias_course: None,
        }
    }

    #[tokio::test]
    async fn insert_assigns_increasing_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let first = store.insert(sample("محمد")).await.unwrap();
        let second = store.insert(sample("سارة")).await.unwrap();
        assert!(second.id > first.id);
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn list_round_trips_arabic_literals_and_optional_course() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let mut with_course = sample("خالد");
        with_course.user_type = UserType::EmployeeSon;
        with_course.email = Some("khalid@example.com".into());
        with_course.ias_course = Some(IasCourse::ALL[1]);

        let a = store.insert(sample("محمد")).await.unwrap();
        let b = store.insert(with_course).await.unwrap();

        let listed = store.list().await.unwrap();
        assert_eq!(listed, vec![a, b]);
        assert_eq!(listed[1].user_type.label(), "ابن موظف");
    }

    #[tokio::test]
    async fn empty_table_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        assert!(store.list().await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn missing_table_is_a_database_error() {
        let dir = tempfile::tempdir().unwrap();
        let endpoint = Endpoint::sqlite_file(dir.path().join("forms.db"));
        let store = RegistrationStore::connect(&NativeConnector, &endpoint)
            .await
            .unwrap();
        let err = store.insert(sample("محمد")).await.unwrap_err();
        assert!(matches!(err, Error::Database(_)));
    }

    #[test]
    fn postgres_insert_casts_choice_values() {
        let sql = insert_sql(BackendKind::Postgres);
        assert!(sql.contains("CAST(CAST($7 AS TEXT) AS \"usertype\")"));
        assert!(sql.contains("CAST(CAST($10 AS TEXT) AS \"iascourse\")"));
        assert!(sql.ends_with("RETURNING CAST(\"id\" AS TEXT)"));
    }
}
