use std::cmp;

use crate::distribution::{self, Distribution};
use crate::error;
use crate::types::{MFloat, Mtime};

pub struct ArrivalData<'a> {
    pub scheduled_arrival: Mtime,
    pub departure: &'a Distribution,
    /// Arrival delay per departure delay, indexed from delay 0. `None` if the train has no
    /// travel time model.
    pub travel_distributions: Option<Vec<&'a Distribution>>,
    pub is_message: Option<Mtime>,
}

impl<'a> ArrivalData<'a> {
    fn travel_distribution(&self, travel: &[&'a Distribution], departure_delay: Mtime) -> &'a Distribution {
        let idx = cmp::min(cmp::max(departure_delay, 0) as usize, travel.len() - 1);
        travel[idx]
    }

    /// Smallest and largest possible arrival delay.
    pub fn bounds(&self, travel: &[&'a Distribution]) -> (Mtime, Mtime) {
        let mut left = Mtime::MAX;
        let mut right = Mtime::MIN;
        for p in self.departure.first_minute()..=self.departure.last_minute() {
            let t = self.travel_distribution(travel, p);
            left = cmp::min(left, p + t.first_minute());
            right = cmp::max(right, p + t.last_minute());
        }
        (left, right)
    }
}

/// Convolution of the departure distribution with the travel time distributions.
pub fn compute_arrival_distribution(data: &ArrivalData) -> Distribution {
    if let Some(observed) = data.is_message {
        return Distribution::one_point(observed - data.scheduled_arrival, data.departure.sum());
    }
    let travel = match &data.travel_distributions {
        Some(travel) if !travel.is_empty() && data.departure.exists() => travel,
        _ => return data.departure.clone(),
    };

    let (left, right) = data.bounds(travel);
    let mut probabilities: Vec<MFloat> = (left..=right)
        .map(|arrival_delay| {
            (data.departure.first_minute()..=data.departure.last_minute())
                .map(|p| {
                    data.departure.probability_equal(p)
                        * data.travel_distribution(travel, p).probability_equal(arrival_delay - p)
                })
                .sum()
        })
        .collect();

    if let Err(e) = distribution::correct_rounding_errors(data.departure.sum(), &mut probabilities) {
        error::invariant_violation(&e);
    }
    Distribution::new(&probabilities, left)
}
