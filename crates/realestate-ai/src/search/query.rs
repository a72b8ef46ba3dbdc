use std::collections::HashMap;

use rusqlite::types::Value;
use serde::Serialize;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 50;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Newest,
    Price,
    /// Rank by text match and proximity when either is present.
    Relevance,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            None | Some("newest") => SortOrder::Newest,
            Some("price") => SortOrder::Price,
            Some(_) => SortOrder::Relevance,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    /// Parses `lat,lon`.
    pub fn parse(raw: &str) -> Option<Self> {
        let (lat, lon) = raw.trim().split_once(',')?;
        let lat = lat.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        let lon = lon.trim().parse::<f64>().ok().filter(|v| v.is_finite())?;
        Some(Self { lat, lon })
    }
}

/// Normalised `/search` query string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub beds: Option<f64>,
    pub baths: Option<f64>,
    pub community: Option<String>,
    pub near: Option<GeoPoint>,
    pub radius_km: Option<f64>,
    pub page: u32,
    pub page_size: u32,
    pub sort: SortOrder,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            q: None,
            min_price: None,
            max_price: None,
            beds: None,
            baths: None,
            community: None,
            near: None,
            radius_km: None,
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            sort: SortOrder::Newest,
        }
    }
}

/// Zero, blank and unparsable values count as absent.
fn nonzero(raw: Option<&String>) -> Option<f64> {
    raw.and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|value| value.is_finite() && *value != 0.0)
}

fn trimmed(raw: Option<&String>) -> Option<String> {
    raw.map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl SearchParams {
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let page = nonzero(query.get("page")).unwrap_or(1.0).max(1.0).floor() as u32;
        let page_size = nonzero(query.get("pageSize"))
            .unwrap_or(f64::from(DEFAULT_PAGE_SIZE))
            .clamp(1.0, f64::from(MAX_PAGE_SIZE))
            .floor() as u32;

        Self {
            q: trimmed(query.get("q")),
            min_price: nonzero(query.get("minPrice")),
            max_price: nonzero(query.get("maxPrice")),
            beds: nonzero(query.get("beds")),
            baths: nonzero(query.get("baths")),
            community: trimmed(query.get("community")),
            near: query.get("near").and_then(|raw| GeoPoint::parse(raw)),
            radius_km: nonzero(query.get("radius_km")),
            page,
            page_size,
            sort: SortOrder::parse(query.get("sort").map(String::as_str)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }

    /// Stable key for the result cache.
    pub fn cache_key(&self) -> String {
        format!(
            "search:{}",
            serde_json::to_string(self).unwrap_or_default()
        )
    }
}

/// Quotes each whitespace-separated term so user input never reaches the
/// FTS5 query grammar; all terms must match.
pub fn match_expression(raw: &str) -> Option<String> {
    let terms: Vec<String> = raw
        .split_whitespace()
        .map(|term| format!("\"{}\"", term.replace('"', "\"\"")))
        .collect();
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" AND "))
    }
}

/// Parameterised SQL for one search page plus its total count.
#[derive(Debug, Clone)]
pub struct BuiltQuery {
    pub select_sql: String,
    pub count_sql: String,
    pub params: Vec<Value>,
    pub has_near: bool,
}

const SELECT_FIELDS: &[&str] = &[
    "listings.id",
    "listings.title",
    "listings.price_aed",
    "listings.bedrooms",
    "listings.bathrooms",
    "listings.sqft",
    "listings.community",
];

pub struct SearchQueryBuilder<'a> {
    params: &'a SearchParams,
    values: Vec<Value>,
}

impl<'a> SearchQueryBuilder<'a> {
    pub fn new(params: &'a SearchParams) -> Self {
        Self {
            params,
            values: Vec::new(),
        }
    }

    fn bind(&mut self, value: Value) -> usize {
        self.values.push(value);
        self.values.len()
    }

    pub fn build(mut self) -> BuiltQuery {
        let params = self.params;
        let mut from = String::from("listings");
        let mut conditions: Vec<String> = Vec::new();
        let mut computed: Vec<String> = Vec::new();

        let match_expr = params.q.as_deref().and_then(match_expression);
        let has_term = match_expr.is_some();
        if let Some(expr) = match_expr {
            let index = self.bind(Value::Text(expr));
            from = String::from("listings_fts JOIN listings ON listings.rowid = listings_fts.rowid");
            conditions.push(format!("listings_fts MATCH ?{index}"));
            computed.push("-bm25(listings_fts) AS text_rank".to_string());
        }

        if let Some(min_price) = params.min_price {
            let index = self.bind(Value::Real(min_price));
            conditions.push(format!("listings.price_aed >= ?{index}"));
        }
        if let Some(max_price) = params.max_price {
            let index = self.bind(Value::Real(max_price));
            conditions.push(format!("listings.price_aed <= ?{index}"));
        }
        if let Some(beds) = params.beds {
            let index = self.bind(Value::Real(beds));
            conditions.push(format!("listings.bedrooms >= ?{index}"));
        }
        if let Some(baths) = params.baths {
            let index = self.bind(Value::Real(baths));
            conditions.push(format!("listings.bathrooms >= ?{index}"));
        }
        if let Some(community) = &params.community {
            let index = self.bind(Value::Text(community.clone()));
            conditions.push(format!("listings.community = ?{index}"));
        }

        let has_near = params.near.is_some();
        if let Some(point) = params.near {
            let lat = self.bind(Value::Real(point.lat));
            let lon = self.bind(Value::Real(point.lon));
            let distance = format!("haversine_km(listings.lat, listings.lon, ?{lat}, ?{lon})");
            computed.push(format!("{distance} AS distance_km"));
            computed.push(format!("1.0 / (1.0 + {distance}) AS distance_score"));
            if let Some(radius_km) = params.radius_km {
                let radius = self.bind(Value::Real(radius_km));
                conditions.push(format!("{distance} <= ?{radius}"));
            }
        }

        let order = match params.sort {
            SortOrder::Price => "listings.price_aed ASC".to_string(),
            SortOrder::Newest => "listings.created_at DESC".to_string(),
            SortOrder::Relevance => {
                let mut clauses = Vec::new();
                if has_term {
                    clauses.push("text_rank DESC");
                }
                if has_near {
                    clauses.push("distance_score DESC");
                }
                clauses.push("listings.created_at DESC");
                clauses.join(", ")
            }
        };

        let where_sql = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };
        let fields: Vec<&str> = SELECT_FIELDS
            .iter()
            .copied()
            .chain(computed.iter().map(String::as_str))
            .collect();

        BuiltQuery {
            select_sql: format!(
                "SELECT {} FROM {from}{where_sql} ORDER BY {order} LIMIT {} OFFSET {}",
                fields.join(", "),
                params.page_size,
                params.offset()
            ),
            count_sql: format!("SELECT count(*) FROM {from}{where_sql}"),
            params: self.values,
            has_near,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect()
    }

    #[test]
    fn defaults_and_clamping() {
        let params = SearchParams::from_query(&query(&[]));
        assert_eq!(params, SearchParams::default());

        let params = SearchParams::from_query(&query(&[
            ("page", "0"),
            ("pageSize", "500"),
            ("minPrice", "abc"),
            ("beds", "0"),
            ("q", "   "),
        ]));
        assert_eq!(params.page, 1);
        assert_eq!(params.page_size, MAX_PAGE_SIZE);
        assert_eq!(params.min_price, None);
        assert_eq!(params.beds, None);
        assert_eq!(params.q, None);

        let params = SearchParams::from_query(&query(&[("page", "3"), ("pageSize", "-4")]));
        assert_eq!(params.page, 3);
        assert_eq!(params.page_size, 1);
        assert_eq!(params.offset(), 2);
    }

    #[test]
    fn near_requires_two_finite_coordinates() {
        assert_eq!(
            GeoPoint::parse("25.2, 55.27"),
            Some(GeoPoint {
                lat: 25.2,
                lon: 55.27
            })
        );
        assert_eq!(GeoPoint::parse("25.2"), None);
        assert_eq!(GeoPoint::parse("25.2,55,1"), None);
        assert_eq!(GeoPoint::parse("north,east"), None);
    }

    #[test]
    fn unknown_sort_ranks_by_relevance() {
        assert_eq!(SortOrder::parse(None), SortOrder::Newest);
        assert_eq!(SortOrder::parse(Some("price")), SortOrder::Price);
        assert_eq!(SortOrder::parse(Some("best")), SortOrder::Relevance);
    }

    #[test]
    fn match_expression_quotes_terms() {
        assert_eq!(
            match_expression("marina \"view"),
            Some("\"marina\" AND \"\"\"view\"".to_string())
        );
        assert_eq!(match_expression("  "), None);
    }

    #[test]
    fn builder_binds_filters_in_order() {
        let params = SearchParams {
            q: Some("marina".to_string()),
            min_price: Some(1_000_000.0),
            community: Some("Dubai Marina".to_string()),
            near: Some(GeoPoint {
                lat: 25.08,
                lon: 55.14,
            }),
            radius_km: Some(5.0),
            sort: SortOrder::Relevance,
            ..SearchParams::default()
        };
        let built = SearchQueryBuilder::new(&params).build();

        assert!(built.has_near);
        assert_eq!(built.params.len(), 6);
        assert!(built.select_sql.contains("listings_fts MATCH ?1"));
        assert!(built.select_sql.contains("listings.price_aed >= ?2"));
        assert!(built.select_sql.contains("listings.community = ?3"));
        assert!(built
            .select_sql
            .contains("haversine_km(listings.lat, listings.lon, ?4, ?5) <= ?6"));
        assert!(built
            .select_sql
            .contains("ORDER BY text_rank DESC, distance_score DESC, listings.created_at DESC"));
        assert!(built.select_sql.ends_with("LIMIT 20 OFFSET 0"));
        assert!(built.count_sql.starts_with("SELECT count(*) FROM listings_fts JOIN"));
    }

    #[test]
    fn radius_is_ignored_without_near() {
        let params = SearchParams {
            radius_km: Some(5.0),
            sort: SortOrder::Price,
            ..SearchParams::default()
        };
        let built = SearchQueryBuilder::new(&params).build();
        assert!(built.params.is_empty());
        assert!(!built.select_sql.contains("WHERE"));
        assert!(built.select_sql.contains("ORDER BY listings.price_aed ASC"));
    }
}
