use rand::Rng;
use rand_pcg::Pcg64;
use rand_seeder::Seeder;

use crate::{BookingRequest, RequestId, Route, StationLine};

pub struct ScenarioParameters {
    pub num_groups: usize,
    pub max_members: u32,
    pub fare_per_section: f64,
}

impl Default for ScenarioParameters {
    fn default() -> Self {
        Self {
            num_groups: 20,
            max_members: 40,
            fare_per_section: 5.0,
        }
    }
}

/// Random groups on `stations`, reproducible from `seed`.
///
/// Origins and destinations are drawn independently, so some routes come out
/// reversed or zero length and carry no fare.
pub fn generate_group_requests(
    seed: &str,
    params: &ScenarioParameters,
    stations: &StationLine,
) -> Vec<BookingRequest> {
    let mut rng: Pcg64 = Seeder::from(seed).make_rng();

    if stations.is_empty() {
        return vec![];
    }

    (0..params.num_groups)
        .map(|index| {
            let origin = &stations.stations()[rng.gen_range(0..stations.len())];
            let destination = &stations.stations()[rng.gen_range(0..stations.len())];
            let members = rng.gen_range(1..=params.max_members.max(1));
            BookingRequest::new(
                index as RequestId + 1,
                Route::new(origin.clone(), destination.clone()),
                members,
                params.fare_per_section,
                stations,
            )
        })
        .collect()
}

#[cfg(test)]
#[test]
fn test_generation_is_reproducible() {
    let line = StationLine::default();
    let params = ScenarioParameters::default();

    let first = generate_group_requests("seed", &params, &line);
    let second = generate_group_requests("seed", &params, &line);
    assert_eq!(first, second);
    assert_eq!(first.len(), params.num_groups);

    let ids: Vec<_> = first.iter().map(|r| r.id()).collect();
    assert_eq!(ids, (1..=params.num_groups as u64).collect::<Vec<_>>());

    for request in &first {
        assert!(request.members() >= 1 && request.members() <= params.max_members);
        assert!(line.contains(&request.route().origin));
        assert!(line.contains(&request.route().destination));
    }
}
