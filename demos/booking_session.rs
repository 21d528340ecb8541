use tracing_subscriber::{filter::EnvFilter, fmt};
use train_seat_allocation::{BookingError, BookingSystem, Result, TrainConfig};

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let config = match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| BookingError::InvalidConfig(format!("{}: {}", path, e)))?;
            TrainConfig::from_toml_str(&text)?
        }
        None => TrainConfig::default(),
    };
    let fare = config.default_fare_per_section;
    let mut system = BookingSystem::create_with_config(config)?;

    for (route, members) in [("AD", 20), ("AB", 90), ("AC", 15), ("BD", 8), ("CB", 4)] {
        let request = system.add_group(route, members, fare)?;
        println!(
            "ID {} | {} | {} members | ${:.2}",
            request.id(),
            request.route(),
            request.members(),
            request.total_fare()
        );
    }

    println!("{}", system.run_allocation(fare)?.debug_table());

    let cancellation = system.cancel(2);
    println!("{}", cancellation);

    if let Some(outcome) = system.last_outcome() {
        println!("{}", outcome.debug_table());
    }
    Ok(())
}
