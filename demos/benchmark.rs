use std::time::SystemTime;

use train_seat_allocation::scenario_generation::{generate_group_requests, ScenarioParameters};
use train_seat_allocation::{AllocationAlgorithm, GreedyAllocator, Ledger, StationLine};

fn main() {
    let line = StationLine::new(["A", "B", "C", "D", "E", "F", "G", "H"]);

    for num_groups in [10, 100, 1_000, 10_000, 100_000] {
        let params = ScenarioParameters {
            num_groups,
            max_members: 40,
            fare_per_section: 5.0,
        };

        for run in 0..10 {
            let mut requests = generate_group_requests(&format!("{} {}", num_groups, run), &params, &line);
            let mut ledger = Ledger::with_capacity(num_groups as u32 * 5);

            let timer = SystemTime::now();
            let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, params.fare_per_section);
            let greedy_dur = timer.elapsed();

            println!(
                "{} {} {:?} booked={} revenue={:.2}",
                num_groups,
                run,
                greedy_dur,
                outcome.booked().len(),
                outcome.revenue_total()
            );
        }
    }
}
