use lxdelta_core::config;

pub(crate) fn run_config_generate(dest: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match dest {
        Some(d) => std::path::PathBuf::from(d),
        None => pick_config_location()?,
    };

    if path.exists() {
        return Err(format!("file already exists: {}", path.display()).into());
    }

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    std::fs::write(&path, config::minimal_config_template())?;
    println!("Config written to: {}", path.display());
    println!("Edit it to set the backup target and container filters.");
    Ok(())
}

fn pick_config_location() -> Result<std::path::PathBuf, Box<dyn std::error::Error>> {
    let search_paths = config::default_config_search_paths();

    let descriptions: &[&str] = &[
        "Best for: trying things out from a working directory",
        "Best for: a personal account that drives lxc",
        "Best for: scheduled backups run as root or via systemd",
    ];

    let labels: &[&str] = &["Local directory", "User config", "System-wide"];

    eprintln!("Where should the config file live?");
    for (i, (((path, _level), label), desc)) in search_paths
        .iter()
        .zip(labels.iter())
        .zip(descriptions.iter())
        .enumerate()
    {
        eprintln!("  [{}] {} {}", i + 1, label, path.display());
        eprintln!("      {desc}");
    }
    eprint!("Choice [1]: ");
    std::io::Write::flush(&mut std::io::stderr())?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    let selection = parse_choice(input.trim(), search_paths.len())?;

    Ok(search_paths[selection].0.clone())
}

/// Zero-based index of the chosen location. Empty input picks the first.
fn parse_choice(input: &str, count: usize) -> Result<usize, Box<dyn std::error::Error>> {
    if input.is_empty() {
        return Ok(0);
    }
    let n: usize = input
        .parse()
        .map_err(|_| format!("invalid choice: '{input}'"))?;
    if n == 0 || n > count {
        return Err(format!("choice out of range: {n}").into());
    }
    Ok(n - 1)
}
