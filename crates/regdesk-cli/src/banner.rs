use regdesk_config::AppConfig;

/// Print the startup banner with a config summary.
pub fn print_banner(host: &str, port: u16, config: &AppConfig, head: Option<&str>) {
    let version = env!("CARGO_PKG_VERSION");

    let database = regdesk_config::mask_url(&config.database.url);
    let schema = match head {
        Some(head) if !config.database.skip_migrations => format!("migrated to {head}"),
        _ => "created from data model".to_string(),
    };
    let listing = if config.gateway.api_key.is_some() {
        "api key required"
    } else {
        "closed (no api key)"
    };
    let url = format!("http://{host}:{port}");

    // Layout
    let width = 76;
    let label_w = 12;
    let value_w = width - label_w - 5; // "│ " + " " + " │"

    let title = format!("regdesk v{version}");
    let top = format!("╭─── {title} {}╮", "─".repeat(width - 7 - title.chars().count()));
    let bottom = format!("╰{}╯", "─".repeat(width - 2));

    let row = |l: &str, r: &str| {
        let r: String = if r.chars().count() > value_w {
            r.chars().take(value_w - 1).chain(['…']).collect()
        } else {
            r.to_string()
        };
        format!("│ {:<label_w$} {:<value_w$} │", l, r)
    };

    println!("{top}");
    println!("{}", row("", ""));
    println!("{}", row("Gateway", &url));
    println!("{}", row("Database", &database));
    println!("{}", row("Schema", &schema));
    println!("{}", row("Listing", listing));
    println!("{}", row("", ""));
    println!("{}", row("", "Press Ctrl+C to stop"));
    println!("{bottom}");
}
