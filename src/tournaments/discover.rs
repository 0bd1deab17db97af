//! Finding tournaments: the home page, the search page and the map.

use axum::{Json, extract::Query};
use chrono::NaiveDate;
use diesel::{connection::LoadConnection, prelude::*, sqlite::Sqlite};
use hypertext::prelude::*;
use serde::{Deserialize, Serialize};

use crate::{
    auth::User,
    permission::Role,
    schema::tournaments,
    state::Conn,
    template::{APP_NAME, Page},
    tournaments::{
        Tournament, TournamentStatus,
        catalog::{KATHMANDU, NEPAL_PROVINCES, SPORTS_TYPES},
        fees::format_npr_f64,
        today,
        view::osm_link,
    },
    util_resp::{FailureResponse, StandardResponse, success},
};

const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance between two `(lat, lng)` points.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lat2) = (a.0.to_radians(), b.0.to_radians());
    let d_lat = (b.0 - a.0).to_radians();
    let d_lng = (b.1 - a.1).to_radians();

    let h = (d_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeadlineFilter {
    #[default]
    All,
    Open,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Near {
    pub lat: f64,
    pub lng: f64,
    pub radius_km: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryFilter {
    pub q: String,
    pub province: Option<String>,
    pub sport: Option<String>,
    pub deadline: DeadlineFilter,
    pub near: Option<Near>,
}

impl DiscoveryFilter {
    pub fn matches(&self, t: &Tournament, today: NaiveDate) -> bool {
        let q = self.q.trim().to_lowercase();
        if !q.is_empty()
            && ![&t.name, &t.venue_name, &t.sport_type]
                .iter()
                .any(|field| field.to_lowercase().contains(&q))
        {
            return false;
        }
        if self.province.as_ref().is_some_and(|p| *p != t.province) {
            return false;
        }
        if self.sport.as_ref().is_some_and(|s| *s != t.sport_type) {
            return false;
        }
        match self.deadline {
            DeadlineFilter::All => (),
            DeadlineFilter::Open if !t.registration_open(today) => return false,
            DeadlineFilter::Closed if t.registration_open(today) => return false,
            _ => (),
        }
        if let Some(near) = self.near {
            match t.latitude.zip(t.longitude) {
                Some(at) if haversine_km((near.lat, near.lng), at) <= near.radius_km => (),
                _ => return false,
            }
        }
        true
    }
}

/// The search form's query string.
#[derive(Deserialize, Serialize, Debug, Default, Clone)]
pub struct DiscoveryQuery {
    #[serde(default)]
    pub q: String,
    #[serde(default)]
    pub province: String,
    #[serde(default)]
    pub sport: String,
    #[serde(default)]
    pub deadline: String,
    #[serde(default)]
    pub lat: String,
    #[serde(default)]
    pub lng: String,
    #[serde(default)]
    pub radius_km: String,
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

impl DiscoveryQuery {
    pub fn filter(&self) -> DiscoveryFilter {
        let deadline = match self.deadline.as_str() {
            "open" => DeadlineFilter::Open,
            "closed" => DeadlineFilter::Closed,
            _ => DeadlineFilter::All,
        };
        let near = match (self.centre(), self.radius_km.trim().parse::<f64>()) {
            (Some((lat, lng)), Ok(radius_km)) if radius_km > 0.0 => {
                Some(Near { lat, lng, radius_km })
            }
            _ => None,
        };
        DiscoveryFilter {
            q: self.q.trim().to_string(),
            province: non_blank(&self.province),
            sport: non_blank(&self.sport),
            deadline,
            near,
        }
    }

    /// The point the player searched around, if they gave one.
    fn centre(&self) -> Option<(f64, f64)> {
        let lat = self.lat.trim().parse::<f64>().ok()?;
        let lng = self.lng.trim().parse::<f64>().ok()?;
        ((-90.0..=90.0).contains(&lat) && (-180.0..=180.0).contains(&lng))
            .then_some((lat, lng))
    }
}

/// Tournaments players can find, featured ones first.
fn listed(
    conn: &mut impl LoadConnection<Backend = Sqlite>,
) -> QueryResult<Vec<Tournament>> {
    tournaments::table
        .filter(
            tournaments::status
                .eq_any([TournamentStatus::Approved, TournamentStatus::Active]),
        )
        .order_by((tournaments::premium_listing.desc(), tournaments::start_date))
        .select(Tournament::as_select())
        .load(conn)
}

pub struct TournamentCard<'r> {
    pub tournament: &'r Tournament,
    pub today: NaiveDate,
    pub distance_km: Option<f64>,
}

impl<'r> Renderable for TournamentCard<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let t = self.tournament;
        let availability = t.availability(self.today);
        let fee = if t.entry_fee > 0.0 {
            format_npr_f64(t.entry_fee)
        } else {
            "Free".to_string()
        };
        let image = t.image_urls().ok().and_then(|urls| urls.into_iter().next());
        let distance = self.distance_km.map(|d| format!("{d:.1} km away"));
        let map = t.latitude.zip(t.longitude).map(|(lat, lng)| osm_link(lat, lng));

        maud! {
            div class="col" {
                div class=(if t.premium_listing { "card h-100 border-warning" } else { "card h-100" }) {
                    @if let Some(image) = &image {
                        img src=(image) class="card-img-top" alt=(t.name) style="height: 10rem; object-fit: cover";
                    }
                    div class="card-body" {
                        div class="d-flex justify-content-between align-items-start" {
                            h3 class="h5 card-title" {
                                a href=(format!("/tournament/{}", t.id)) class="stretched-link text-decoration-none" {
                                    (t.name)
                                }
                            }
                            @if t.premium_listing {
                                span class="badge text-bg-warning" { "Featured" }
                            }
                        }
                        p class="card-text text-muted small mb-2" {
                            (t.sport_type) " · " (t.venue_name) ", " (t.district)
                        }
                        p class="card-text mb-1" {
                            (t.start_date.format("%Y-%m-%d").to_string())
                            " · " (fee)
                            @if t.prize_pool > 0.0 {
                                " · Prize " (format_npr_f64(t.prize_pool))
                            }
                        }
                        @if let Some(distance) = &distance {
                            p class="card-text small mb-1" { (distance) }
                        }
                    }
                    div class="card-footer d-flex justify-content-between" {
                        span class=(format!("badge text-bg-{}", availability.colour())) {
                            (availability.label())
                        }
                        span class="small text-muted" {
                            (t.current_participants) "/" (t.max_participants) " players"
                        }
                    }
                    @if let Some(map) = &map {
                        a href=(map) class="small px-3 pb-2 position-relative" style="z-index: 2"
                            target="_blank" rel="noopener" {
                            "Open in OpenStreetMap"
                        }
                    }
                }
            }
        }
        .render_to(buffer)
    }
}

struct SearchForm<'r> {
    action: &'r str,
    query: &'r DiscoveryQuery,
    map: bool,
}

impl<'r> Renderable for SearchForm<'r> {
    fn render_to(
        &self,
        buffer: &mut hypertext::Buffer<hypertext::context::Node>,
    ) {
        let q = self.query;
        maud! {
            form method="get" action=(self.action) class="row g-2 mb-4" {
                div class="col-md-4" {
                    input type="search" name="q" class="form-control" value=(q.q)
                        placeholder="Search by name, venue or sport";
                }
                div class="col-md-3" {
                    select name="province" class="form-select" {
                        option value="" { "All provinces" }
                        @for province in NEPAL_PROVINCES {
                            option value=(province.name) selected[q.province == province.name] {
                                (province.name)
                            }
                        }
                    }
                }
                div class="col-md-3" {
                    select name="sport" class="form-select" {
                        option value="" { "All sports" }
                        @for sport in SPORTS_TYPES {
                            option value=(sport) selected[q.sport == *sport] { (sport) }
                        }
                    }
                }
                @if self.map {
                    div class="col-md-2" {
                        select name="deadline" class="form-select" {
                            option value="all" selected[q.deadline != "open" && q.deadline != "closed"] { "Any deadline" }
                            option value="open" selected[q.deadline == "open"] { "Registration open" }
                            option value="closed" selected[q.deadline == "closed"] { "Registration closed" }
                        }
                    }
                    div class="col-md-3" {
                        input type="text" name="lat" class="form-control" value=(q.lat) placeholder="Latitude";
                    }
                    div class="col-md-3" {
                        input type="text" name="lng" class="form-control" value=(q.lng) placeholder="Longitude";
                    }
                    div class="col-md-3" {
                        input type="number" min="1" name="radius_km" class="form-control"
                            value=(q.radius_km) placeholder="Within (km)";
                    }
                }
                div class="col-md-2" {
                    button type="submit" class="btn btn-primary w-100" { "Search" }
                }
            }
        }
        .render_to(buffer)
    }
}

pub async fn home_page(
    user: Option<User<false>>,
    mut conn: Conn<false>,
) -> StandardResponse {
    let today = today();
    let featured: Vec<Tournament> = listed(&mut *conn)?
        .into_iter()
        .filter(|t| t.registration_open(today))
        .take(6)
        .collect();
    let role = user.as_ref().map(|user| user.role);

    success(
        Page::new()
            .user_opt(user)
            .body(maud! {
                div class="p-5 mb-4 bg-body-tertiary rounded-3" {
                    h1 class="display-5 fw-bold" { (APP_NAME) }
                    p class="fs-5" {
                        "Find sports tournaments across Nepal, sign up in minutes "
                        "and follow your results."
                    }
                    div class="d-flex flex-wrap gap-2" {
                        a href="/facilities" class="btn btn-primary btn-lg" { "Find tournaments" }
                        a href="/tournament-map" class="btn btn-outline-secondary btn-lg" { "Tournament map" }
                        @match role {
                            None => {
                                a href="/register" class="btn btn-outline-secondary btn-lg" { "Sign up" }
                            }
                            Some(Role::Player) => {
                                a href="/player-dashboard" class="btn btn-outline-secondary btn-lg" { "My dashboard" }
                            }
                            Some(Role::Organizer) => {
                                a href="/create-tournament" class="btn btn-outline-secondary btn-lg" { "Host a tournament" }
                            }
                            Some(Role::Admin) => {
                                a href="/admin" class="btn btn-outline-secondary btn-lg" { "Review tournaments" }
                            }
                        }
                    }
                }
                h2 class="h4 mb-3" { "Open for registration" }
                @if featured.is_empty() {
                    p class="text-muted" { "No tournaments are open for registration right now." }
                } @else {
                    div class="row row-cols-1 row-cols-md-3 g-3 mb-4" {
                        @for t in &featured {
                            TournamentCard tournament=(t) today=(today) distance_km=(None);
                        }
                    }
                }
                h2 class="h5" { "Browse by sport" }
                div class="d-flex flex-wrap gap-2" {
                    @for sport in SPORTS_TYPES.iter().take(12) {
                        a href=(format!("/facilities?sport={}", url_escape(sport)))
                            class="btn btn-sm btn-outline-primary" { (sport) }
                    }
                }
            })
            .render(),
    )
}

fn url_escape(s: &str) -> String {
    url::form_urlencoded::byte_serialize(s.as_bytes()).collect()
}

pub async fn facilities_page(
    user: Option<User<false>>,
    mut conn: Conn<false>,
    Query(query): Query<DiscoveryQuery>,
) -> StandardResponse {
    let today = today();
    let filter = query.filter();
    let found: Vec<Tournament> = listed(&mut *conn)?
        .into_iter()
        .filter(|t| filter.matches(t, today))
        .collect();

    success(
        Page::new()
            .title("Find tournaments")
            .user_opt(user)
            .body(maud! {
                h1 { "Find tournaments" }
                SearchForm action="/facilities" query=(&query) map=(false);
                p class="text-muted" { (found.len()) " tournaments found" }
                div class="row row-cols-1 row-cols-md-3 g-3" {
                    @for t in &found {
                        TournamentCard tournament=(t) today=(today) distance_km=(None);
                    }
                }
            })
            .render(),
    )
}

/// Matching tournaments which have coordinates, nearest to `centre` first.
fn by_distance(
    tournaments: Vec<Tournament>,
    filter: &DiscoveryFilter,
    centre: (f64, f64),
    today: NaiveDate,
) -> Vec<(Tournament, f64)> {
    let mut found: Vec<(Tournament, f64)> = tournaments
        .into_iter()
        .filter(|t| filter.matches(t, today))
        .filter_map(|t| {
            let at = t.latitude.zip(t.longitude)?;
            let distance = haversine_km(centre, at);
            Some((t, distance))
        })
        .collect();
    found.sort_by(|a, b| a.1.total_cmp(&b.1));
    found
}

pub async fn tournament_map_page(
    user: Option<User<false>>,
    mut conn: Conn<false>,
    Query(query): Query<DiscoveryQuery>,
) -> StandardResponse {
    let today = today();
    let filter = query.filter();
    let centre = query.centre().unwrap_or(KATHMANDU);
    let found = by_distance(listed(&mut *conn)?, &filter, centre, today);
    let markers = format!(
        "/tournament-map/markers?{}",
        serde_urlencoded::to_string(&query).unwrap_or_default()
    );
    let centre_link = osm_link(centre.0, centre.1);

    success(
        Page::new()
            .title("Tournament map")
            .user_opt(user)
            .body(maud! {
                h1 { "Tournament map" }
                SearchForm action="/tournament-map" query=(&query) map=(true);
                p class="text-muted" {
                    (found.len()) " tournaments, nearest to "
                    a href=(&centre_link) target="_blank" rel="noopener" {
                        (format!("{:.4}, {:.4}", centre.0, centre.1))
                    }
                    " first. "
                    a href=(&markers) { "Marker data (JSON)" }
                }
                div class="row row-cols-1 row-cols-md-3 g-3" {
                    @for (t, distance) in &found {
                        TournamentCard tournament=(t) today=(today) distance_km=(Some(*distance));
                    }
                }
            })
            .render(),
    )
}

#[derive(Serialize, Debug, PartialEq)]
pub struct Marker {
    pub id: String,
    pub name: String,
    pub sport_type: String,
    pub lat: f64,
    pub lng: f64,
    pub distance_km: f64,
    pub availability: &'static str,
    pub url: String,
}

pub async fn map_markers(
    mut conn: Conn<false>,
    Query(query): Query<DiscoveryQuery>,
) -> Result<Json<Vec<Marker>>, FailureResponse> {
    let today = today();
    let filter = query.filter();
    let centre = query.centre().unwrap_or(KATHMANDU);

    let markers = by_distance(listed(&mut *conn)?, &filter, centre, today)
        .into_iter()
        .filter_map(|(t, distance_km)| {
            let (lat, lng) = t.latitude.zip(t.longitude)?;
            Some(Marker {
                url: format!("/tournament/{}", t.id),
                availability: t.availability(today).label(),
                id: t.id,
                name: t.name,
                sport_type: t.sport_type,
                lat,
                lng,
                distance_km,
            })
        })
        .collect();

    Ok(Json(markers))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::tournaments::test_support::tournament;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, d).unwrap()
    }

    #[test]
    fn distances_between_cities() {
        let pokhara = (28.2096, 83.9856);
        let d = haversine_km(KATHMANDU, pokhara);
        assert!((140.0..145.0).contains(&d), "{d}");
        assert_eq!(haversine_km(pokhara, pokhara), 0.0);
    }

    #[test]
    fn search_is_case_insensitive() {
        let t = tournament();
        let filter = |q: &str| DiscoveryFilter {
            q: q.to_string(),
            ..Default::default()
        };
        assert!(filter("futsal cup").matches(&t, day(1)));
        assert!(filter("DASHARATH").matches(&t, day(1)));
        assert!(!filter("cricket").matches(&t, day(1)));
    }

    #[test]
    fn province_and_sport_must_match_exactly() {
        let t = tournament();
        let mut filter = DiscoveryFilter {
            province: Some("Bagmati Province".to_string()),
            sport: Some("Futsal".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&t, day(1)));
        filter.sport = Some("futsal".to_string());
        assert!(!filter.matches(&t, day(1)));
    }

    #[test]
    fn deadline_filter() {
        let t = tournament();
        let open = DiscoveryFilter {
            deadline: DeadlineFilter::Open,
            ..Default::default()
        };
        let closed = DiscoveryFilter {
            deadline: DeadlineFilter::Closed,
            ..Default::default()
        };
        // the deadline is the 1st of March
        assert!(open.matches(&t, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap()));
        assert!(!open.matches(&t, day(1)));
        assert!(closed.matches(&t, day(1)));
    }

    #[test]
    fn radius_excludes_far_and_unmapped_tournaments() {
        let mut t = tournament();
        let near = |radius_km| DiscoveryFilter {
            near: Some(Near {
                lat: KATHMANDU.0,
                lng: KATHMANDU.1,
                radius_km,
            }),
            ..Default::default()
        };
        assert!(near(5.0).matches(&t, day(1)));
        assert!(!near(1.0).matches(&t, day(1)));

        t.latitude = None;
        assert!(!near(500.0).matches(&t, day(1)));
    }

    #[test]
    fn query_strings_become_filters() {
        let query = DiscoveryQuery {
            q: "  cup ".to_string(),
            sport: "Futsal".to_string(),
            deadline: "open".to_string(),
            lat: "27.7".to_string(),
            lng: "85.3".to_string(),
            radius_km: "10".to_string(),
            ..Default::default()
        };
        let filter = query.filter();
        assert_eq!(filter.q, "cup");
        assert_eq!(filter.province, None);
        assert_eq!(filter.sport.as_deref(), Some("Futsal"));
        assert_eq!(filter.deadline, DeadlineFilter::Open);
        assert_eq!(
            filter.near,
            Some(Near {
                lat: 27.7,
                lng: 85.3,
                radius_km: 10.0
            })
        );

        let no_radius = DiscoveryQuery {
            lat: "27.7".to_string(),
            lng: "85.3".to_string(),
            ..Default::default()
        };
        assert_eq!(no_radius.filter().near, None);
    }

    #[test]
    fn map_lists_nearest_first() {
        let near = tournament();
        let mut far = tournament();
        far.id = "far".to_string();
        far.latitude = Some(28.2096);
        far.longitude = Some(83.9856);
        let mut unmapped = tournament();
        unmapped.id = "unmapped".to_string();
        unmapped.latitude = None;

        let found = by_distance(
            vec![far, unmapped, near],
            &DiscoveryFilter::default(),
            KATHMANDU,
            day(1),
        );
        let ids: Vec<&str> = found.iter().map(|(t, _)| t.id.as_str()).collect();
        assert_eq!(ids, ["tournament_test", "far"]);
    }
}
