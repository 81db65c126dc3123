use anyhow::{bail, Context, Result};
use cms::DirectoryIncludeHandler;
use cms::GeneratorOptions;
use cms::Input;
use cms::ReturnSemanticPolicy;
use cms::SemanticPolicy;
use cms::ShaderModel;
use docopt::Docopt;
use env_logger::Env;
use log::{error, info};
use serde::Deserialize;
use std::fs;
use std::path::PathBuf;
use std::process;

const USAGE: &str = "
Unity macro shader generator

Creates one pixel shader per function defined in a Unity include file.

Usage:
  create_macro_shaders [options] [-I <include_path>...] [<source-file>]
  create_macro_shaders --help

Options:
  -h --help                  Show help.
  -o <output_dir>            Directory to write shaders to [default: ../../../shaders/source/macros].
  -I <include_path>          Path to search for includes in. Defaults to CGIncludes.
  --semantics <policy>       Parameter semantics, positional or lettered [default: positional].
  --void-return <policy>     Return semantic of void functions, target or bare [default: target].
  --models <list>            Shader models for the metadata line [default: 4_1,5_0].
  --stdout                   Print shaders instead of writing files.
";

const DEFAULT_SOURCE_FILE: &str = "CGIncludes/UnityCG.cginc";
const DEFAULT_INCLUDE_PATH: &str = "CGIncludes";

#[derive(Debug, Deserialize)]
#[allow(non_snake_case)]
struct Args {
    flag_o: String,
    flag_I: Vec<String>,
    flag_semantics: String,
    flag_void_return: String,
    flag_models: String,
    flag_stdout: bool,
    arg_source_file: Option<String>,
}

fn options(args: &Args) -> Result<GeneratorOptions> {
    let semantics = match &args.flag_semantics[..] {
        "positional" => SemanticPolicy::Positional,
        "lettered" => SemanticPolicy::Lettered,
        other => bail!("unknown semantic policy '{}'", other),
    };
    let return_semantic = match &args.flag_void_return[..] {
        "target" => ReturnSemanticPolicy::Always,
        "bare" => ReturnSemanticPolicy::OmitForVoid,
        other => bail!("unknown void return policy '{}'", other),
    };
    let metadata = args.flag_models
                       .split(',')
                       .map(|model| model.trim().parse::<ShaderModel>())
                       .collect::<Result<Vec<_>, _>>()
                       .with_context(|| format!("invalid shader model list '{}'", args.flag_models))?;
    Ok(GeneratorOptions {
        metadata,
        semantics,
        return_semantic,
        ..GeneratorOptions::default()
    })
}

fn include_paths(args: &Args) -> Result<Vec<PathBuf>> {
    // A missing default directory only means includes will not resolve
    if args.flag_I.is_empty() {
        return Ok(vec![PathBuf::from(DEFAULT_INCLUDE_PATH)]);
    }
    let paths = args.flag_I.iter().map(PathBuf::from).collect::<Vec<_>>();
    for path in &paths {
        if !path.is_dir() {
            bail!("include path '{}' is not a directory", path.display());
        }
    }
    Ok(paths)
}

fn run(args: Args) -> Result<()> {
    let options = options(&args)?;
    let include_paths = include_paths(&args)?;

    let source_file = args.arg_source_file.clone().unwrap_or_else(|| DEFAULT_SOURCE_FILE.to_string());
    let source_contents = fs::read_to_string(&source_file)
        .with_context(|| format!("failed to read file '{}'", source_file))?;

    let input = Input {
        file_name: source_file.clone(),
        main_file: source_contents,
        file_loader: Box::new(DirectoryIncludeHandler::new(include_paths)),
        options,
    };
    let output = cms::cginc_to_macros(input)?;

    if args.flag_stdout {
        cms::print_shaders(&output.shaders);
    } else {
        let output_dir = PathBuf::from(&args.flag_o);
        let written = cms::write_shaders(&output_dir, &output.shaders)?;
        info!("wrote {} shaders to {}", written.len(), output_dir.display());
    }
    info!("{}: {} shaders generated, {} functions skipped",
          source_file,
          output.shaders.len(),
          output.skipped.len());
    Ok(())
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let args: Args = Docopt::new(USAGE).and_then(|d| d.deserialize()).unwrap_or_else(|e| e.exit());

    if let Err(err) = run(args) {
        error!("{:#}", err);
        process::exit(1);
    }
}

#[cfg(test)]
fn args(argv: &[&str]) -> Args {
    Docopt::new(USAGE)
        .and_then(|d| d.argv(argv.iter().copied()).deserialize())
        .unwrap()
}

#[test]
fn default_options() {
    let args = args(&["create_macro_shaders"]);
    assert_eq!(args.flag_o, "../../../shaders/source/macros");
    assert_eq!(args.arg_source_file, None);
    assert!(!args.flag_stdout);
    assert_eq!(options(&args).unwrap(), GeneratorOptions::default());
    assert_eq!(include_paths(&args).unwrap(), vec![PathBuf::from("CGIncludes")]);
}

#[test]
fn policy_options() {
    let args = args(&["create_macro_shaders",
                      "--semantics",
                      "lettered",
                      "--void-return",
                      "bare",
                      "--models",
                      "5_0",
                      "--stdout",
                      "Other.cginc"]);
    let options = options(&args).unwrap();
    assert_eq!(options.semantics, SemanticPolicy::Lettered);
    assert_eq!(options.return_semantic, ReturnSemanticPolicy::OmitForVoid);
    assert_eq!(options.metadata, vec![ShaderModel::V5_0]);
    assert!(args.flag_stdout);
    assert_eq!(args.arg_source_file, Some("Other.cginc".to_string()));
}

#[test]
fn invalid_options() {
    let semantics = options(&args(&["create_macro_shaders", "--semantics", "numbered"])).unwrap_err();
    assert_eq!(semantics.to_string(), "unknown semantic policy 'numbered'");
    let void_return = options(&args(&["create_macro_shaders", "--void-return", "none"])).unwrap_err();
    assert_eq!(void_return.to_string(), "unknown void return policy 'none'");
    let models = options(&args(&["create_macro_shaders", "--models", "4_1,6_0"])).unwrap_err();
    assert_eq!(models.to_string(), "invalid shader model list '4_1,6_0'");

    let missing = args(&["create_macro_shaders", "-I", "no/such/include/dir"]);
    assert!(include_paths(&missing).is_err());
}
