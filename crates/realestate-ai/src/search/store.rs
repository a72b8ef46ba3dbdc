use std::path::Path;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::functions::FunctionFlags;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use super::migrations;
use super::query::{SearchParams, SearchQueryBuilder};

const EARTH_RADIUS_KM: f64 = 6371.0088;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error("could not prepare database directory: {0}")]
    Io(#[from] std::io::Error),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("invalid full-text query `{query}`: {message}")]
    InvalidQuery { query: String, message: String },
}

/// Great-circle distance between two WGS84 points.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

/// A listing ready to be written, keyed by its permit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewListing {
    pub permit: String,
    pub title: String,
    pub description: Option<String>,
    pub price_aed: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub sqft: f64,
    pub community: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ListingRecord {
    pub id: String,
    #[serde(flatten)]
    pub listing: NewListing,
    pub created_at: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchItem {
    pub id: String,
    pub title: String,
    pub price_aed: f64,
    pub bedrooms: i64,
    pub bathrooms: i64,
    pub sqft: f64,
    pub community: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage {
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    pub items: Vec<SearchItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FacetCount<T> {
    pub value: T,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Facets {
    pub community: Vec<FacetCount<String>>,
    pub bedrooms: Vec<FacetCount<i64>>,
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn to_count(raw: i64) -> u64 {
    u64::try_from(raw).unwrap_or(0)
}

fn round_km(distance: f64) -> f64 {
    (distance * 100.0).round() / 100.0
}

fn search_item(row: &Row<'_>, has_near: bool) -> rusqlite::Result<SearchItem> {
    let distance_km = if has_near {
        row.get::<_, Option<f64>>("distance_km")?
            .filter(|distance| distance.is_finite())
            .map(round_km)
    } else {
        None
    };
    Ok(SearchItem {
        id: row.get("id")?,
        title: row.get("title")?,
        price_aed: row.get("price_aed")?,
        bedrooms: row.get("bedrooms")?,
        bathrooms: row.get("bathrooms")?,
        sqft: row.get("sqft")?,
        community: row.get("community")?,
        distance_km,
    })
}

fn listing_record(row: &Row<'_>) -> rusqlite::Result<ListingRecord> {
    Ok(ListingRecord {
        id: row.get("id")?,
        listing: NewListing {
            permit: row.get("permit")?,
            title: row.get("title")?,
            description: row.get("description")?,
            price_aed: row.get("price_aed")?,
            bedrooms: row.get("bedrooms")?,
            bathrooms: row.get("bathrooms")?,
            sqft: row.get("sqft")?,
            community: row.get("community")?,
            lat: row.get("lat")?,
            lon: row.get("lon")?,
        },
        created_at: row.get("created_at")?,
    })
}

fn is_match_syntax_error(err: &rusqlite::Error) -> bool {
    match err {
        rusqlite::Error::SqliteFailure(_, Some(message)) => {
            let message = message.to_lowercase();
            (message.contains("fts5") && message.contains("syntax"))
                || message.contains("malformed match expression")
                || message.contains("unterminated")
        }
        _ => false,
    }
}

/// Updates by permit, otherwise inserts. Runs inside the caller's transaction.
pub fn upsert_listing(
    tx: &Transaction<'_>,
    listing: &NewListing,
    now: DateTime<Utc>,
) -> Result<UpsertOutcome, SearchError> {
    let updated = tx.execute(
        "UPDATE listings
         SET title = ?2, description = ?3, price_aed = ?4, bedrooms = ?5,
             bathrooms = ?6, sqft = ?7, community = ?8, lat = ?9, lon = ?10
         WHERE permit = ?1",
        params![
            listing.permit,
            listing.title,
            listing.description,
            listing.price_aed,
            listing.bedrooms,
            listing.bathrooms,
            listing.sqft,
            listing.community,
            listing.lat,
            listing.lon,
        ],
    )?;
    if updated > 0 {
        return Ok(UpsertOutcome::Updated);
    }

    let inserted = tx.execute(
        "INSERT INTO listings
            (id, permit, title, description, price_aed, bedrooms, bathrooms, sqft,
             community, lat, lon, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
         ON CONFLICT (permit) DO NOTHING",
        params![
            Uuid::new_v4().to_string(),
            listing.permit,
            listing.title,
            listing.description,
            listing.price_aed,
            listing.bedrooms,
            listing.bathrooms,
            listing.sqft,
            listing.community,
            listing.lat,
            listing.lon,
            timestamp(now),
        ],
    )?;
    Ok(if inserted > 0 {
        UpsertOutcome::Inserted
    } else {
        UpsertOutcome::Unchanged
    })
}

/// SQLite-backed listing index shared by search and ingestion.
pub struct ListingStore {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for ListingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListingStore").finish_non_exhaustive()
    }
}

impl ListingStore {
    /// Opens (creating if needed) a database file and applies pending migrations.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SearchError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        info!(path = %path.display(), "search.db opened");
        Self::bootstrap(conn)
    }

    pub fn open_in_memory() -> Result<Self, SearchError> {
        Self::bootstrap(Connection::open_in_memory()?)
    }

    pub fn open_optional(path: Option<&Path>) -> Result<Self, SearchError> {
        match path {
            Some(path) => Self::open(path),
            None => Self::open_in_memory(),
        }
    }

    fn bootstrap(mut conn: Connection) -> Result<Self, SearchError> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.create_scalar_function(
            "haversine_km",
            4,
            FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
            |ctx| {
                Ok(haversine_km(
                    ctx.get::<f64>(0)?,
                    ctx.get::<f64>(1)?,
                    ctx.get::<f64>(2)?,
                    ctx.get::<f64>(3)?,
                ))
            },
        )?;
        migrations::apply_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Re-applies pending migrations; returns the resulting schema version.
    pub fn apply_schema(&self) -> Result<u32, SearchError> {
        migrations::apply_schema(&mut self.lock())
    }

    pub fn schema_version(&self) -> Result<u32, SearchError> {
        migrations::current_version(&self.lock())
    }

    /// Runs `work` in one transaction; any error rolls everything back.
    pub fn transaction<T, F>(&self, work: F) -> Result<T, SearchError>
    where
        F: FnOnce(&Transaction<'_>) -> Result<T, SearchError>,
    {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        let value = work(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    pub fn upsert(
        &self,
        listing: &NewListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, SearchError> {
        self.transaction(|tx| upsert_listing(tx, listing, now))
    }

    pub fn count(&self) -> Result<u64, SearchError> {
        let count: i64 = self
            .lock()
            .query_row("SELECT count(*) FROM listings", [], |row| row.get(0))?;
        Ok(to_count(count))
    }

    pub fn find_by_permit(&self, permit: &str) -> Result<Option<ListingRecord>, SearchError> {
        Ok(self
            .lock()
            .query_row(
                "SELECT * FROM listings WHERE permit = ?1",
                [permit],
                listing_record,
            )
            .optional()?)
    }

    /// Inserts the demo listings that are not already present by permit.
    pub fn seed(&self, now: DateTime<Utc>) -> Result<usize, SearchError> {
        let inserted = self.transaction(|tx| {
            let mut inserted = 0;
            for (age_days, listing) in demo_listings().iter().enumerate() {
                let created_at = now - chrono::Duration::days(age_days as i64);
                let changed = tx.execute(
                    "INSERT INTO listings
                        (id, permit, title, description, price_aed, bedrooms, bathrooms,
                         sqft, community, lat, lon, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                     ON CONFLICT (permit) DO NOTHING",
                    params![
                        Uuid::new_v4().to_string(),
                        listing.permit,
                        listing.title,
                        listing.description,
                        listing.price_aed,
                        listing.bedrooms,
                        listing.bathrooms,
                        listing.sqft,
                        listing.community,
                        listing.lat,
                        listing.lon,
                        timestamp(created_at),
                    ],
                )?;
                inserted += changed;
            }
            Ok(inserted)
        })?;
        info!(inserted, "search.seed");
        Ok(inserted)
    }

    pub fn search(&self, params: &SearchParams) -> Result<SearchPage, SearchError> {
        let built = SearchQueryBuilder::new(params).build();
        let conn = self.lock();
        let map_err = |err: rusqlite::Error| {
            if is_match_syntax_error(&err) {
                SearchError::InvalidQuery {
                    query: params.q.clone().unwrap_or_default(),
                    message: err.to_string(),
                }
            } else {
                SearchError::Sqlite(err)
            }
        };

        let total: i64 = conn
            .query_row(&built.count_sql, params_from_iter(built.params.iter()), |row| {
                row.get(0)
            })
            .map_err(map_err)?;

        let mut statement = conn.prepare(&built.select_sql)?;
        let items = statement
            .query_map(params_from_iter(built.params.iter()), |row| {
                search_item(row, built.has_near)
            })
            .map_err(map_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(map_err)?;

        Ok(SearchPage {
            total: to_count(total),
            page: params.page,
            page_size: params.page_size,
            items,
        })
    }

    pub fn facets(&self) -> Result<Facets, SearchError> {
        let conn = self.lock();
        let community = conn
            .prepare(
                "SELECT community, count(*) AS count FROM listings
                 GROUP BY community ORDER BY count DESC, community ASC",
            )?
            .query_map([], |row| {
                Ok(FacetCount {
                    value: row.get(0)?,
                    count: to_count(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let bedrooms = conn
            .prepare(
                "SELECT bedrooms, count(*) AS count FROM listings
                 GROUP BY bedrooms ORDER BY bedrooms ASC",
            )?
            .query_map([], |row| {
                Ok(FacetCount {
                    value: row.get(0)?,
                    count: to_count(row.get(1)?),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Facets {
            community,
            bedrooms,
        })
    }
}

/// permit, title, description, price, beds, baths, sqft, community, lat, lon
type DemoRow = (
    &'static str,
    &'static str,
    &'static str,
    f64,
    i64,
    i64,
    f64,
    &'static str,
    f64,
    f64,
);

const DEMO_LISTINGS: &[DemoRow] = &[
    (
        "DLD-SEED-001",
        "Downtown duplex with Burj Khalifa view",
        "Spacious duplex on a high floor steps from Dubai Mall",
        2_500_000.0,
        2,
        3,
        1600.0,
        "Downtown Dubai",
        25.1972,
        55.2744,
    ),
    (
        "DLD-SEED-002",
        "Marina 1BR with sea view",
        "Bright one bedroom overlooking the marina walk",
        1_600_000.0,
        1,
        1,
        820.0,
        "Dubai Marina",
        25.0805,
        55.1403,
    ),
    (
        "DLD-SEED-003",
        "Palm Jumeirah signature villa",
        "Beachfront villa with private pool and garden",
        12_000_000.0,
        5,
        6,
        6200.0,
        "Palm Jumeirah",
        25.1124,
        55.1390,
    ),
    (
        "DLD-SEED-004",
        "Family townhouse in Arabian Ranches",
        "Three bedroom townhouse close to schools and golf course",
        3_100_000.0,
        3,
        4,
        2400.0,
        "Arabian Ranches",
        25.0550,
        55.2690,
    ),
    (
        "DLD-SEED-005",
        "Business Bay studio near canal",
        "Furnished studio with canal view, ideal for investors",
        750_000.0,
        0,
        1,
        450.0,
        "Business Bay",
        25.1850,
        55.2650,
    ),
    (
        "DLD-SEED-006",
        "JVC two bedroom apartment",
        "Modern apartment with balcony and community pool",
        1_150_000.0,
        2,
        2,
        1100.0,
        "Jumeirah Village Circle",
        25.0590,
        55.2060,
    ),
];

/// Demo Dubai inventory, newest first.
pub fn demo_listings() -> Vec<NewListing> {
    DEMO_LISTINGS
        .iter()
        .map(|row| NewListing {
            permit: row.0.to_string(),
            title: row.1.to_string(),
            description: Some(row.2.to_string()),
            price_aed: row.3,
            bedrooms: row.4,
            bathrooms: row.5,
            sqft: row.6,
            community: row.7.to_string(),
            lat: row.8,
            lon: row.9,
        })
        .collect()
}
