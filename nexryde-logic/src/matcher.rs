use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    geo::haversine_km,
    location::Location,
    record::{PositionRecord, Role, VehicleClass},
};

/// Nominal service radius in km. Past it the distance penalty is heavy but
/// a candidate still survives unless the caller sets a hard radius.
pub const SERVICE_RADIUS_KM: f64 = 5.0;

const BASE_SCORE: f64 = 100.0;
const NEAR_KM: f64 = 1.0;
const MID_KM: f64 = 3.0;
const MID_PENALTY: f64 = 10.0;
const FAR_PENALTY: f64 = 25.0;
const OUT_OF_RANGE_PENALTY: f64 = 60.0;
const CLASS_MATCH_BONUS: f64 = -15.0;
const CLASS_MISMATCH_PENALTY: f64 = 20.0;
const RATING_PIVOT: f64 = 3.0;
const RATING_WEIGHT: f64 = 5.0;
const EMPTY_VEHICLE_BONUS: f64 = -5.0;
const EXPERIENCED_TRIPS: u32 = 50;
const EXPERIENCE_BONUS: f64 = -5.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
/// Typed driver metadata joined onto a position record for a matching pass
pub struct DriverDetails {
    pub vehicle: VehicleClass,
    pub rating: f64,
    pub seats_taken: u8,
    pub capacity: u8,
    pub completed_trips: u32,
}

#[derive(Debug, Clone)]
pub struct ProviderCandidate {
    pub record: PositionRecord,
    pub details: DriverDetails,
}

#[derive(Debug, Clone)]
pub struct MatchQuery {
    pub rider: Location,
    /// Preferred vehicle class, scored rather than hard-filtered
    pub wanted: Option<VehicleClass>,
    /// Hard service-radius cutoff in km. None keeps distant drivers with a
    /// heavy score penalty instead.
    pub hard_radius_km: Option<f64>,
    /// Maximum record age eligible for pickup matching, in seconds
    pub max_age_seconds: i64,
}

impl MatchQuery {
    pub fn new(rider: Location) -> Self {
        Self {
            rider,
            wanted: None,
            hard_radius_km: None,
            max_age_seconds: 300,
        }
    }

    pub fn wanting(mut self, vehicle: VehicleClass) -> Self {
        self.wanted = Some(vehicle);
        self
    }

    pub fn within(mut self, radius_km: f64) -> Self {
        self.hard_radius_km = Some(radius_km);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchError {
    /// The requester has no usable position, matching cannot run
    LocationUnavailable,
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MatchError::LocationUnavailable => write!(f, "requester location unavailable"),
        }
    }
}

impl std::error::Error for MatchError {}

#[derive(Debug, Clone)]
pub struct RankedDriver {
    pub candidate: ProviderCandidate,
    pub distance_km: f64,
    pub score: f64,
}

/// Stepped penalty that grows as distance to the rider does
fn distance_penalty(km: f64) -> f64 {
    if km <= NEAR_KM {
        0.0
    } else if km <= MID_KM {
        MID_PENALTY
    } else if km <= SERVICE_RADIUS_KM {
        FAR_PENALTY
    } else {
        OUT_OF_RANGE_PENALTY
    }
}

fn score_candidate(query: &MatchQuery, candidate: &ProviderCandidate, distance_km: f64) -> f64 {
    let mut score = BASE_SCORE + distance_penalty(distance_km);

    if let Some(wanted) = query.wanted {
        score += if candidate.details.vehicle == wanted {
            CLASS_MATCH_BONUS
        } else {
            CLASS_MISMATCH_PENALTY
        };
    }

    score -= (candidate.details.rating - RATING_PIVOT) * RATING_WEIGHT;

    if candidate.details.seats_taken == 0 {
        score += EMPTY_VEHICLE_BONUS;
    }
    if candidate.details.completed_trips >= EXPERIENCED_TRIPS {
        score += EXPERIENCE_BONUS;
    }

    score
}

/// Rank drivers for a pickup, best first (lower score wins).
///
/// An empty result is the normal "no drivers" outcome, not an error. The
/// sort is stable and scores compare by total order, so ties keep candidate
/// order.
pub fn rank_drivers(
    query: &MatchQuery,
    candidates: &[ProviderCandidate],
    now: DateTime<Utc>,
) -> Result<Vec<RankedDriver>, MatchError> {
    if !query.rider.is_usable() {
        return Err(MatchError::LocationUnavailable);
    }

    let mut ranked = candidates
        .iter()
        .filter(|c| c.record.role == Role::Driver)
        .filter(|c| !c.record.is_stale(now, query.max_age_seconds))
        .filter(|c| c.details.seats_taken < c.details.capacity)
        .map(|c| {
            let distance_km = haversine_km(query.rider, c.record.location());
            RankedDriver {
                score: score_candidate(query, c, distance_km),
                distance_km,
                candidate: c.clone(),
            }
        })
        .filter(|r| query.hard_radius_km.is_none_or(|radius| r.distance_km <= radius))
        .collect::<Vec<_>>();

    ranked.sort_by(|a, b| a.score.total_cmp(&b.score));

    Ok(ranked)
}
