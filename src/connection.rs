use serde::{Serialize, Deserialize};

use crate::types;

/// Source of an event time. Later variants take precedence over earlier ones.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimestampReason {
	Schedule,
	Propagation,
	Forecast,
	Is,
	Repair
}

impl Default for TimestampReason {
	fn default() -> Self {
		TimestampReason::Schedule
	}
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Footpath {
	pub target_station_idx: usize,
	pub duration: u16
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Route {
	pub id: String,
	pub name: String,
	pub category: String,
	pub nodes: Vec<usize>,
	pub edges: Vec<usize>
}

impl Route {
	pub fn new(id: String, name: String, category: String) -> Route {
		Route {
			id: id,
			name: name,
			category: category,
			nodes: vec![],
			edges: vec![]
		}
	}
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Station {
	pub id: String,
	pub name: String,
	pub transfer_time: u16,
	pub footpaths: Vec<Footpath>,
	pub route_nodes: Vec<usize>
}

impl Station {
	pub fn new(id: String, name: String, transfer_time: u16) -> Station {
		Station {
			id: id,
			name: name,
			transfer_time: transfer_time,
			footpaths: vec![],
			route_nodes: vec![]
		}
	}

	pub fn walking_duration(&self, to_station_idx: usize) -> Option<u16> {
		self.footpaths.iter().find(|f| f.target_station_idx == to_station_idx).map(|f| f.duration)
	}
}

/// One trip instance travelling along one route edge.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Connection {
	pub train_id: u32,
	pub category: String,
	pub line_identifier: String,
	pub trip_idx: usize,
	pub departure: StopInfo,
	pub arrival: StopInfo
}

impl Connection {
	pub fn new(train_id: u32, category: &str, line_identifier: &str, trip_idx: usize,
	from_scheduled: types::Mtime, to_scheduled: types::Mtime) -> Connection {
		Connection {
			train_id: train_id,
			category: category.to_lowercase(),
			line_identifier: line_identifier.to_owned(),
			trip_idx: trip_idx,
			departure: StopInfo::new(from_scheduled),
			arrival: StopInfo::new(to_scheduled)
		}
	}

	pub fn travel_time(&self) -> types::Mtime {
		self.arrival.scheduled - self.departure.scheduled
	}
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct StopInfo {
	pub scheduled: types::Mtime,
	pub current: types::Mtime,
	#[serde(default)]
	pub reason: TimestampReason,
	pub in_out_allowed: bool
}

impl StopInfo {
	pub fn new(scheduled: types::Mtime) -> StopInfo {
		StopInfo { scheduled: scheduled, current: scheduled, reason: TimestampReason::Schedule, in_out_allowed: true }
	}

	#[inline(always)]
	pub fn projected(&self) -> types::Mtime {
		self.current
	}

	pub fn delay(&self) -> types::Mtime {
		self.current - self.scheduled
	}

	/// Time reported by an IS (actual) message, if any.
	pub fn is_time(&self) -> Option<types::Mtime> {
		match self.reason {
			TimestampReason::Is => Some(self.current),
			_ => None
		}
	}

	/// Accepts `time` if `reason` is at least as authoritative as the current one.
	pub fn update(&mut self, time: types::Mtime, reason: TimestampReason) -> bool {
		if reason < self.reason {
			return false;
		}
		self.current = time;
		self.reason = reason;
		true
	}
}


#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn projected_delay() {
		let mut s = StopInfo::new(5);
		assert!(s.update(8, TimestampReason::Forecast));
		assert_eq!(s.projected(), 8);
		assert_eq!(s.delay(), 3);
		assert_eq!(s.is_time(), None);
	}

	#[test]
	fn projected_wo_delay() {
		let s = StopInfo::new(5);
		assert_eq!(s.projected(), 5);
		assert_eq!(s.delay(), 0);
	}

	#[test]
	fn reason_precedence() {
		let mut s = StopInfo::new(10);
		assert!(s.update(15, TimestampReason::Is));
		assert!(!s.update(12, TimestampReason::Forecast));
		assert_eq!(s.projected(), 15);
		assert_eq!(s.is_time(), Some(15));
		assert!(s.update(14, TimestampReason::Is));
		assert_eq!(s.projected(), 14);
		assert!(s.update(16, TimestampReason::Repair));
		assert_eq!(s.is_time(), None);
		assert!(TimestampReason::Repair > TimestampReason::Is);
		assert!(TimestampReason::Forecast > TimestampReason::Propagation);
		assert!(TimestampReason::Propagation > TimestampReason::Schedule);
	}

	#[test]
	fn category_is_lowercased() {
		let c = Connection::new(1, "ICE", "", 0, 10, 20);
		assert_eq!(c.category, "ice");
		assert_eq!(c.travel_time(), 10);
	}

	#[test]
	fn walking() {
		let mut s = Station::new("a".to_owned(), "A".to_owned(), 2);
		s.footpaths.push(Footpath { target_station_idx: 3, duration: 7 });
		assert_eq!(s.walking_duration(3), Some(7));
		assert_eq!(s.walking_duration(4), None);
	}
}
