use std::path::Path;

use itertools::Itertools;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::distribution::{self, Distribution};
use crate::error::{Error, Result};
use crate::types::{MFloat, Mtime};

/// Empirical delay model: how late trains start their trip and how departure delays evolve
/// while travelling along one route edge.
pub trait StartAndTravelDistributions {
    fn start_distribution(&self, category: &str) -> &Distribution;

    /// One distribution of the arrival delay per departure delay `0..=to_departure_delay`.
    /// `None` if the category has no travel time model.
    fn travel_time_distributions(
        &self,
        category: &str,
        travel_time: Mtime,
        to_departure_delay: Mtime,
    ) -> Option<Vec<&Distribution>>;
}

pub struct ConstantDistributions {
    start: Distribution,
    travel: Distribution,
}

impl ConstantDistributions {
    pub fn new(start: Distribution, travel: Distribution) -> ConstantDistributions {
        ConstantDistributions { start, travel }
    }
}

impl Default for ConstantDistributions {
    fn default() -> Self {
        ConstantDistributions::new(
            Distribution::new(&[0.8, 0.2], 0),
            Distribution::new(&[0.1, 0.8, 0.1], -1),
        )
    }
}

impl StartAndTravelDistributions for ConstantDistributions {
    fn start_distribution(&self, _category: &str) -> &Distribution {
        &self.start
    }

    fn travel_time_distributions(
        &self,
        _category: &str,
        _travel_time: Mtime,
        to_departure_delay: Mtime,
    ) -> Option<Vec<&Distribution>> {
        Some(vec![&self.travel; to_departure_delay.max(0) as usize + 1])
    }
}

#[derive(Deserialize)]
struct ClassRecord {
    category: String,
    class: String,
}

#[derive(Deserialize)]
struct DistributionRecord {
    id: u32,
    delay_minute: Mtime,
    probability: MFloat,
}

/// Travel time interval is left-open, departure delay interval right-open. Empty upper
/// bounds extend to the configured maximum.
#[derive(Deserialize)]
struct MappingRecord {
    id: u32,
    class: String,
    travel_time_from: i32,
    travel_time_to: Option<i32>,
    delay_from: i32,
    delay_to: Option<i32>,
}

#[derive(Deserialize)]
struct StartRecord {
    class: String,
    delay_minute: Mtime,
    probability: MFloat,
}

/// Delay model loaded from a folder of CSV files as published by the railway operator.
pub struct DbDistributions {
    category_to_class: FxHashMap<String, String>,
    distributions: Vec<Distribution>,
    /// class -> travel time -> departure delay -> index into `distributions`
    mappings: FxHashMap<String, Vec<Vec<usize>>>,
    start_distributions: FxHashMap<String, Distribution>,
    default_start: Distribution,
    default_travel: Distribution,
}

fn read_records<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;
    let mut records = vec![];
    for r in reader.deserialize() {
        records.push(r?);
    }
    Ok(records)
}

/// Groups (id, minute, probability) rows into distributions, filling skipped minutes with 0.
/// Distributions that do not sum to 1 are normalized.
fn group_distributions<K: Ord + Clone>(mut rows: Vec<(K, Mtime, MFloat)>) -> Vec<(K, Distribution)> {
    rows.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
    let mut grouped = vec![];
    for (id, group) in &rows.into_iter().group_by(|r| r.0.clone()) {
        let group: Vec<(K, Mtime, MFloat)> = group.collect();
        let first = group[0].1;
        let mut probabilities = vec![0.0; (group[group.len() - 1].1 - first + 1) as usize];
        for (_, minute, p) in group {
            probabilities[(minute - first) as usize] += p;
        }
        let sum: MFloat = probabilities.iter().sum();
        if sum <= 0.0 {
            warn!("distribution starting at minute {} has no mass, skipping it", first);
            continue;
        }
        if (sum - 1.0).abs() > distribution::EPSILON {
            warn!("distribution starting at minute {} has sum {}, normalizing it", first, sum);
            probabilities.iter_mut().for_each(|p| *p /= sum);
        }
        grouped.push((id, Distribution::new(&probabilities, first)));
    }
    grouped
}

impl DbDistributions {
    pub fn load(root: &str, max_expected_travel_time: Mtime, max_expected_departure_delay: Mtime) -> Result<DbDistributions> {
        let root = Path::new(root);
        let classes: Vec<ClassRecord> = read_records(&root.join("classes.csv"))?;
        let rows: Vec<DistributionRecord> = read_records(&root.join("distributions.csv"))?;
        let mapping_rows: Vec<MappingRecord> = read_records(&root.join("mapping.csv"))?;
        let start_rows: Vec<StartRecord> = read_records(&root.join("start_distributions.csv"))?;

        let category_to_class = classes
            .into_iter()
            .map(|c| (c.category.to_lowercase(), c.class))
            .collect();

        let grouped = group_distributions(rows.into_iter().map(|r| (r.id, r.delay_minute, r.probability)).collect());
        let id_to_idx: FxHashMap<u32, usize> = grouped.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
        let distributions: Vec<Distribution> = grouped.into_iter().map(|(_, d)| d).collect();

        let mut resolved: FxHashMap<String, Vec<Vec<Option<usize>>>> = FxHashMap::default();
        for m in mapping_rows {
            let idx = match id_to_idx.get(&m.id) {
                Some(idx) => *idx,
                None => {
                    warn!("mapping references unknown distribution {}", m.id);
                    continue;
                }
            };
            let from_travel_time = (m.travel_time_from + 1).max(0);
            let to_travel_time = m.travel_time_to.map_or(max_expected_travel_time, |t| t.min(max_expected_travel_time));
            let from_delay = m.delay_from.max(0);
            let to_delay = m.delay_to.map_or(max_expected_departure_delay, |d| (d - 1).min(max_expected_departure_delay));
            if from_travel_time > to_travel_time || from_delay > to_delay {
                debug!("skipping empty mapping for distribution {}", m.id);
                continue;
            }
            let table = resolved.entry(m.class).or_default();
            for t in from_travel_time..=to_travel_time {
                let t = t as usize;
                if table.len() <= t {
                    table.resize(t + 1, vec![]);
                }
                for d in from_delay..=to_delay {
                    let d = d as usize;
                    if table[t].len() <= d {
                        table[t].resize(d + 1, None);
                    }
                    table[t][d] = Some(idx);
                }
            }
        }
        let mappings = resolved
            .into_iter()
            .map(|(class, table)| {
                let table = table
                    .into_iter()
                    .map(|delays| {
                        // gaps reuse the distribution of the next smaller known delay,
                        // leading gaps the first known one
                        let mut prev = delays.iter().flatten().next().copied();
                        let mut dense = Vec::with_capacity(delays.len());
                        for d in delays {
                            if d.is_some() {
                                prev = d;
                            }
                            if let Some(idx) = prev {
                                dense.push(idx);
                            }
                        }
                        dense
                    })
                    .collect();
                (class, table)
            })
            .collect();

        let start_distributions = group_distributions(
            start_rows.into_iter().map(|r| (r.class, r.delay_minute, r.probability)).collect(),
        )
        .into_iter()
        .collect();

        let db = DbDistributions {
            category_to_class,
            distributions,
            mappings,
            start_distributions,
            default_start: Distribution::one_point(0, 1.0),
            default_travel: Distribution::one_point(0, 1.0),
        };
        info!(
            "loaded {} distributions for {} classes from {}",
            db.distributions.len(),
            db.mappings.len(),
            root.display()
        );
        Ok(db)
    }

    fn class(&self, category: &str) -> Option<&String> {
        self.category_to_class.get(&category.to_lowercase())
    }
}

impl StartAndTravelDistributions for DbDistributions {
    fn start_distribution(&self, category: &str) -> &Distribution {
        self.class(category)
            .and_then(|c| self.start_distributions.get(c))
            .unwrap_or(&self.default_start)
    }

    fn travel_time_distributions(
        &self,
        category: &str,
        travel_time: Mtime,
        to_departure_delay: Mtime,
    ) -> Option<Vec<&Distribution>> {
        let table = self.mappings.get(self.class(category)?)?;
        if table.is_empty() {
            return None;
        }
        let count = to_departure_delay.max(0) as usize + 1;
        let t = (travel_time.max(0) as usize).min(table.len().saturating_sub(1));
        // unknown travel times fall back to the largest known one below
        let delays = match table[..=t].iter().rev().find(|d| !d.is_empty()) {
            Some(delays) => delays,
            None => return Some(vec![&self.default_travel; count]),
        };
        let result = (0..count)
            .map(|d| &self.distributions[delays[d.min(delays.len() - 1)]])
            .collect();
        Some(result)
    }
}

/// Delay model as configured: CSV files if a folder is given, constant distributions otherwise.
pub fn load_delay_model(config: &Config) -> Result<Box<dyn StartAndTravelDistributions>> {
    match &config.distributions_path {
        Some(path) => {
            if !Path::new(path).is_dir() {
                return Err(Error::Io {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
                });
            }
            Ok(Box::new(DbDistributions::load(
                path,
                config.max_expected_travel_time,
                config.max_expected_departure_delay,
            )?))
        }
        None => {
            info!("no distributions configured, using constant distributions");
            Ok(Box::new(ConstantDistributions::default()))
        }
    }
}
