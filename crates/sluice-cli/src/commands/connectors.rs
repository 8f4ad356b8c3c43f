use sluice_engine::ConnectorRegistry;

/// Execute the `connectors` command: list the built-in connector types.
pub fn execute() {
    let registry = ConnectorRegistry::builtin();
    println!("Sources:");
    for kind in registry.source_kinds() {
        println!("  {kind}");
    }
    println!("Destinations:");
    for kind in registry.destination_kinds() {
        println!("  {kind}");
    }
}
