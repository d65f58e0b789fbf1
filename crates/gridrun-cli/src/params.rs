//! Parameter file loading.

use std::error::Error;
use std::path::Path;

use gridrun_core::Params;
use serde_json::Value;

use crate::TileArgs;

/// Parse a YAML parameter document. An empty document yields empty params.
pub fn parse(text: &str) -> Result<Params, Box<dyn Error>> {
    let value: Value = serde_yaml::from_str(text)?;
    Ok(Params::from_value(value)?)
}

/// Load the parameter file and layer the command line values on top.
pub fn load(args: &TileArgs) -> Result<Params, Box<dyn Error>> {
    let text = std::fs::read_to_string(&args.params).map_err(|e| {
        format!(
            "Failed to read parameter file '{}': {}",
            args.params.display(),
            e
        )
    })?;
    Ok(layer(parse(&text)?, args))
}

fn layer(mut params: Params, args: &TileArgs) -> Params {
    params.set("campaign", path_value(&args.campaign));
    params.set("params", path_value(&args.params));
    params.set("tlatidx", args.tlatidx);
    params.set("tlonidx", args.tlonidx);
    params.set("slatidx", args.slatidx);
    params.set("slonidx", args.slonidx);
    params.set("split", args.split);
    if let Some(rundir) = &args.rundir {
        params.set("rundir", path_value(rundir));
    }
    params
}

fn path_value(path: &Path) -> Value {
    Value::String(path.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn args(params: PathBuf) -> TileArgs {
        TileArgs {
            campaign: PathBuf::from("/campaigns/maize"),
            params,
            tlatidx: 3,
            tlonidx: 4,
            slatidx: 1,
            slonidx: 2,
            split: 2,
            latidx: None,
            lonidx: None,
            rundir: Some(PathBuf::from("/runs/1")),
            workdir: PathBuf::from("."),
        }
    }

    #[test]
    fn test_parse_yaml() {
        let params = parse(
            "delta: 30\n\
             tdelta: '120,120'\n\
             model:\n  class: command\n  command: DSCSM046.EXE A X.MZX\n",
        )
        .unwrap();
        assert_eq!(params.delta("delta").unwrap().lat(), 0.5);
        assert_eq!(params.text_in("model", "class").as_deref(), Some("command"));

        assert!(parse("- a\n- b\n").is_err());
    }

    #[test]
    fn test_load_layers_arguments() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("params.yaml");
        std::fs::write(&path, "delta: 30\ncampaign: overridden\n").unwrap();

        let params = load(&args(path.clone())).unwrap();
        assert_eq!(params.text("campaign").as_deref(), Some("/campaigns/maize"));
        assert_eq!(params.text("params"), Some(path.to_string_lossy().into_owned()));
        assert_eq!(params.get_u64("split").unwrap(), Some(2));
        assert_eq!(params.text("rundir").as_deref(), Some("/runs/1"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = load(&args(PathBuf::from("/nonexistent/params.yaml"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/params.yaml"));
    }
}
