use std::collections::HashMap;

use callroute::prelude::*;

fn topology() -> HashMap<&'static str, &'static str> {
    [
        ("server", "group|loadbalanced|primary|backup"),
        ("server.primary", "group|random|t1|t2"),
        ("server.primary.t1", "target|http://10.0.0.1:80|500|100|400"),
        ("server.primary.t2", "target|http://10.0.0.2:80|500|100|400"),
        ("server.backup", "target|10.0.9.1:80|1000"),
    ]
    .into_iter()
    .collect()
}

fn main() {
    // modules without their own logger only report warnings
    let factory = LogFactory::default().use_fallback(LoggerConfig::in_level(slog::Level::Warning).into());
    factory
        .register_config("routing", &LoggerConfig::in_level(slog::Level::Debug))
        .expect("failed to build the routing logger");
    init_logger_factory(factory);

    let root = DescriptorBuilder::new(BuilderConfig::with_delimiter('|'))
        .build(&topology(), "server")
        .expect("invalid topology");

    for round in 0..4 {
        let outcome = dispatch(
            &root,
            |endpoint: &Endpoint| {
                if endpoint.address().contains("10.0.0.1") {
                    Err(format!("connection to {} refused", endpoint.address()))
                } else {
                    Ok(format!("pong from {}", endpoint.id()))
                }
            },
            800,
        );
        println!("round {round}: {:?} after {} failure(s)", outcome.result(), outcome.exceptions().len());
        if !outcome.exceptions().is_empty() {
            println!("{}", outcome.exceptions());
        }
        let (_, took, exceptions) = outcome.into_parts();
        let causes: Vec<String> = exceptions.into_iter().map(CallException::into_cause).collect();
        println!("round {round} took {took:?}, causes: {causes:?}");
    }

    if let Some(table) = root.as_group().and_then(|g| g.load()) {
        for stats in table.snapshot() {
            println!("{stats:?}");
        }
    }
    // give the async drain a moment to flush
    std::thread::sleep(std::time::Duration::from_millis(100));
}
