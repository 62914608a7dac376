use std::path::Path;

/// Env files applied in order, later files overriding earlier ones.
pub fn env_files(profile: &str) -> [&'static str; 3] {
    if profile == "production" {
        ["config/common.env", "config/prod.env", ".secrets.env"]
    } else {
        ["config/common.env", "config/dev.env", ".secrets.env"]
    }
}

/// Loads the env files for `ROCKET_PROFILE` and reports which ones existed.
///
/// Runs before tracing is initialised, so the caller logs the result.
pub fn load_environment() -> Result<Vec<&'static str>, dotenvy::Error> {
    let profile = dotenvy::var("ROCKET_PROFILE").unwrap_or_else(|_| "development".to_string());
    let mut loaded = Vec::new();

    for env_file in env_files(&profile) {
        if Path::new(env_file).exists() {
            dotenvy::from_filename_override(env_file)?;
            loaded.push(env_file);
        }
    }

    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn production_profile_uses_prod_overrides() {
        assert_eq!(env_files("production")[1], "config/prod.env");
        assert_eq!(env_files("development")[1], "config/dev.env");
        assert_eq!(env_files("debug")[1], "config/dev.env");
    }
}
