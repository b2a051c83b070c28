use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::debug;

use super::Relaxation;
use super::scoring::{ScoredCandidate, sort_scored};
use crate::Posting;
use crate::corrections::location::city_key;
use crate::normalize::hash_key;

/// What counts as one "source" for the per-source cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceKey {
    #[default]
    Employer,
    OriginSource,
}

impl SourceKey {
    fn of(self, posting: &Posting) -> String {
        match self {
            SourceKey::Employer => hash_key(posting.employer_name()),
            SourceKey::OriginSource => hash_key(&posting.origin_source),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DistributorConfig {
    pub target_count: usize,
    pub max_per_source: usize,
    /// Spread picks across target cities when the user has more than one.
    pub city_balance: bool,
    pub quality_gate: f64,
    pub source_key: SourceKey,
}

impl Default for DistributorConfig {
    fn default() -> Self {
        Self {
            target_count: 5,
            max_per_source: 2,
            city_balance: true,
            quality_gate: 0.60,
            source_key: SourceKey::Employer,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Distribution {
    /// Best score first.
    pub selected: Vec<ScoredCandidate>,
    pub relaxations: Vec<Relaxation>,
    /// Picks admitted only by a relaxation pass.
    pub relaxed_hashes: BTreeSet<String>,
}

pub struct DiversityDistributor {
    config: DistributorConfig,
}

#[derive(Default)]
struct Tally {
    per_source: HashMap<String, usize>,
    per_city: HashMap<CityBucket, usize>,
}

/// What a pick counts against for city balance. Cities outside the user's
/// targets, present once the city filter was widened, share one bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CityBucket {
    Target(String),
    Elsewhere,
}

impl DiversityDistributor {
    pub fn new(config: DistributorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DistributorConfig {
        &self.config
    }

    /// Pick up to `target_count` candidates.
    ///
    /// Returns exactly `min(target_count, scored.len())` picks. The quality
    /// gate is dropped when too few candidates clear it, and a greedy walk
    /// that under-fills is followed by passes ignoring city balance, then
    /// the per-source cap.
    pub fn distribute(
        &self,
        mut scored: Vec<ScoredCandidate>,
        target_cities: &[String],
    ) -> Distribution {
        let mut distribution = Distribution::default();
        let target = self.config.target_count.min(scored.len());
        if target == 0 {
            return distribution;
        }

        sort_scored(&mut scored);
        let passing = scored
            .iter()
            .filter(|c| c.score >= self.config.quality_gate)
            .count();
        if passing < target {
            distribution.relaxations.push(Relaxation::QualityGateDropped);
        } else {
            scored.truncate(passing);
        }

        let balance = self.config.city_balance && target_cities.len() > 1;
        let fair_share = self.config.target_count.div_ceil(target_cities.len().max(1));
        let target_keys: HashSet<String> = target_cities.iter().map(|c| city_key(c)).collect();

        let mut admitted = vec![false; scored.len()];
        let mut count = 0;
        let mut tally = Tally::default();

        // Pass 1: every constraint.
        for (i, candidate) in scored.iter().enumerate() {
            if count == target {
                break;
            }
            let source = self.config.source_key.of(&candidate.posting);
            let city = city_bucket(&candidate.posting, &target_keys);
            let source_full = tally.per_source.get(&source).copied().unwrap_or(0)
                >= self.config.max_per_source;
            let city_full = balance
                && city.as_ref().is_some_and(|c| {
                    tally.per_city.get(c).copied().unwrap_or(0) >= fair_share
                });
            if source_full || city_full {
                continue;
            }
            admit(&mut tally, source, city);
            admitted[i] = true;
            count += 1;
        }

        // Pass 2: ignore city balance, keep the source cap.
        if count < target && balance {
            let before = count;
            for (i, candidate) in scored.iter().enumerate() {
                if count == target {
                    break;
                }
                if admitted[i] {
                    continue;
                }
                let source = self.config.source_key.of(&candidate.posting);
                if tally.per_source.get(&source).copied().unwrap_or(0) >= self.config.max_per_source
                {
                    continue;
                }
                admit(&mut tally, source, city_bucket(&candidate.posting, &target_keys));
                admitted[i] = true;
                distribution.relaxed_hashes.insert(candidate.posting.hash.clone());
                count += 1;
            }
            if count > before {
                distribution.relaxations.push(Relaxation::CityBalanceRelaxed);
            }
        }

        // Pass 3: ignore both.
        if count < target {
            for (i, candidate) in scored.iter().enumerate() {
                if count == target {
                    break;
                }
                if admitted[i] {
                    continue;
                }
                admitted[i] = true;
                distribution.relaxed_hashes.insert(candidate.posting.hash.clone());
                count += 1;
            }
            distribution.relaxations.push(Relaxation::SourceCapRelaxed);
        }

        distribution.selected = scored
            .into_iter()
            .zip(admitted)
            .filter_map(|(candidate, keep)| keep.then_some(candidate))
            .collect();

        debug!(
            selected = distribution.selected.len(),
            relaxed = distribution.relaxed_hashes.len(),
            "candidates distributed"
        );
        distribution
    }
}

impl Default for DiversityDistributor {
    fn default() -> Self {
        Self::new(DistributorConfig::default())
    }
}

/// Bucket a pick is counted against; remote postings are never capped.
fn city_bucket(posting: &Posting, target_keys: &HashSet<String>) -> Option<CityBucket> {
    if posting.is_remote() {
        return None;
    }
    let key = city_key(posting.city()?);
    Some(if target_keys.contains(&key) {
        CityBucket::Target(key)
    } else {
        CityBucket::Elsewhere
    })
}

fn admit(tally: &mut Tally, source: String, city: Option<CityBucket>) {
    *tally.per_source.entry(source).or_insert(0) += 1;
    if let Some(city) = city {
        *tally.per_city.entry(city).or_insert(0) += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::REMOTE_LOCATION;
    use crate::test_support::posting;

    fn scored(title: &str, employer: &str, location: &str, score: f64) -> ScoredCandidate {
        ScoredCandidate {
            posting: posting(title, employer, location),
            score,
            rationale: format!("{title} fits"),
        }
    }

    fn cities(names: &[&str]) -> Vec<String> {
        names.iter().map(|c| c.to_string()).collect()
    }

    fn employers(distribution: &Distribution) -> Vec<&str> {
        distribution
            .selected
            .iter()
            .map(|c| c.posting.employer_raw.as_str())
            .collect()
    }

    #[test]
    fn source_cap_holds_when_the_pool_allows_it() {
        let pool = vec![
            scored("A1", "Acme", "London, GB", 0.95),
            scored("A2", "Acme", "London, GB", 0.94),
            scored("A3", "Acme", "London, GB", 0.93),
            scored("B1", "Globex", "London, GB", 0.90),
            scored("C1", "Initech", "London, GB", 0.85),
            scored("D1", "Umbrella", "London, GB", 0.80),
        ];

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London"]));

        assert_eq!(out.selected.len(), 5);
        assert_eq!(employers(&out), vec!["Acme", "Acme", "Globex", "Initech", "Umbrella"]);
        assert!(out.relaxations.is_empty());
        assert!(out.relaxed_hashes.is_empty());
    }

    #[test]
    fn quality_gate_is_dropped_instead_of_returning_too_few() {
        let pool = vec![
            scored("A1", "Acme", "London, GB", 0.90),
            scored("B1", "Globex", "London, GB", 0.50),
            scored("C1", "Initech", "London, GB", 0.45),
        ];

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London"]));

        assert_eq!(out.selected.len(), 3);
        assert_eq!(out.relaxations, vec![Relaxation::QualityGateDropped]);
    }

    #[test]
    fn gate_filters_when_enough_candidates_pass() {
        let mut pool: Vec<ScoredCandidate> = (0..6)
            .map(|i| scored(&format!("Role {i}"), &format!("Employer {i}"), "London, GB", 0.9))
            .collect();
        pool.push(scored("Weak", "Weak Co", "London, GB", 0.2));

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London"]));

        assert_eq!(out.selected.len(), 5);
        assert!(out.selected.iter().all(|c| c.score >= 0.6));
    }

    #[test]
    fn single_source_pool_relaxes_the_cap_to_fill() {
        let pool: Vec<ScoredCandidate> = (0..4)
            .map(|i| scored(&format!("Role {i}"), "Acme", "London, GB", 0.9 - i as f64 * 0.01))
            .collect();

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London"]));

        assert_eq!(out.selected.len(), 4);
        assert_eq!(out.relaxations, vec![Relaxation::SourceCapRelaxed]);
        assert_eq!(out.relaxed_hashes.len(), 2);
    }

    #[test]
    fn cities_are_balanced_then_relaxed() {
        let pool = vec![
            scored("L1", "A", "London, GB", 0.99),
            scored("L2", "B", "London, GB", 0.98),
            scored("L3", "C", "London, GB", 0.97),
            scored("L4", "D", "London, GB", 0.96),
            scored("P1", "E", "Paris, FR", 0.70),
            scored("R1", "F", REMOTE_LOCATION, 0.65),
        ];

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London", "Paris"]));

        // Fair share is ceil(5 / 2) = 3 per city; remote is uncapped.
        let titles: Vec<&str> = out.selected.iter().map(|c| c.posting.title.as_str()).collect();
        assert_eq!(titles, vec!["L1", "L2", "L3", "P1", "R1"]);
        assert!(out.relaxations.is_empty());

        let crowded = vec![
            scored("L1", "A", "London, GB", 0.99),
            scored("L2", "B", "London, GB", 0.98),
            scored("L3", "C", "London, GB", 0.97),
            scored("L4", "D", "London, GB", 0.96),
            scored("P1", "E", "Paris, FR", 0.90),
        ];
        let out = DiversityDistributor::default().distribute(crowded, &cities(&["London", "Paris"]));
        assert_eq!(out.selected.len(), 5);
        assert_eq!(out.relaxations, vec![Relaxation::CityBalanceRelaxed]);
        assert_eq!(out.selected.last().map(|c| c.posting.title.as_str()), Some("P1"));
    }

    #[test]
    fn cities_outside_the_targets_share_one_bucket() {
        let pool = vec![
            scored("B1", "A", "Berlin, DE", 0.99),
            scored("M1", "B", "Madrid, ES", 0.98),
            scored("R1", "C", "Rome, IT", 0.97),
            scored("V1", "D", "Vienna, AT", 0.96),
            scored("L1", "E", "London, GB", 0.80),
            scored("P1", "F", "Paris, FR", 0.75),
        ];

        let out = DiversityDistributor::default().distribute(pool, &cities(&["London", "Paris"]));

        // Fair share is 3: Berlin, Madrid and Rome fill the shared bucket.
        let titles: Vec<&str> = out.selected.iter().map(|c| c.posting.title.as_str()).collect();
        assert_eq!(titles, vec!["B1", "M1", "R1", "L1", "P1"]);
        assert!(out.relaxations.is_empty());
    }

    #[test]
    fn origin_source_key_caps_per_board() {
        let mut pool: Vec<ScoredCandidate> = (0..4)
            .map(|i| scored(&format!("Role {i}"), &format!("Employer {i}"), "London, GB", 0.9))
            .collect();
        for candidate in &mut pool[..3] {
            candidate.posting.origin_source = "board-a".into();
        }
        let distributor = DiversityDistributor::new(DistributorConfig {
            target_count: 3,
            source_key: SourceKey::OriginSource,
            ..DistributorConfig::default()
        });

        let out = distributor.distribute(pool, &cities(&["London"]));

        let boards: Vec<&str> = out.selected.iter().map(|c| c.posting.origin_source.as_str()).collect();
        assert_eq!(boards.iter().filter(|b| **b == "board-a").count(), 2);
        assert!(out.relaxations.is_empty());
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let out = DiversityDistributor::default().distribute(Vec::new(), &cities(&["London"]));
        assert!(out.selected.is_empty());
        assert!(out.relaxations.is_empty());
    }
}
