use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use rigid_yaml::validate::check_document;
use rigid_yaml::Document;

fn main() -> ExitCode {
    match run(env::args().collect()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(message)) => {
            eprintln!("{message}");
            print_usage();
            ExitCode::from(2)
        }
        Err(CliError::Failed(message)) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

#[derive(Debug)]
enum CliError {
    Usage(String),
    Failed(String),
}

#[derive(Debug, PartialEq)]
struct DumpOptions {
    file: PathBuf,
    pretty: bool,
}

fn run(args: Vec<String>) -> Result<(), CliError> {
    if args.len() < 2 {
        return Err(CliError::Usage("not enough arguments".to_string()));
    }

    let command = args[1].as_str();
    match command {
        "check" => {
            let file = parse_check_options(&args[2..])?;
            run_check(&file)
        }
        "dump" => {
            let options = parse_dump_options(&args[2..])?;
            run_dump(&options)
        }
        _ => Err(CliError::Usage(format!("unknown command '{command}'"))),
    }
}

fn read_document(file: &PathBuf) -> Result<Document, CliError> {
    let source = fs::read_to_string(file)
        .map_err(|err| CliError::Failed(format!("reading file {:?}: {err}", file.display().to_string())))?;
    if source.is_empty() {
        return Err(CliError::Failed(rigid_yaml::ErrorKind::YamlEmptyFile.to_string()));
    }
    Document::parse(&source).map_err(|err| CliError::Failed(err.to_string()))
}

fn run_check(file: &PathBuf) -> Result<(), CliError> {
    let document = read_document(file)?;
    check_document(document.root()).map_err(|err| CliError::Failed(err.to_string()))?;
    println!("ok");
    Ok(())
}

fn run_dump(options: &DumpOptions) -> Result<(), CliError> {
    let document = read_document(&options.file)?;
    let rendered = if options.pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    }
    .map_err(|err| CliError::Failed(err.to_string()))?;
    println!("{rendered}");
    Ok(())
}

fn parse_check_options(args: &[String]) -> Result<PathBuf, CliError> {
    match args {
        [file] if !file.starts_with("--") => Ok(PathBuf::from(file)),
        [] => Err(CliError::Usage("check requires an input file".to_string())),
        [file] => Err(CliError::Usage(format!("unknown option '{file}'"))),
        [_, extra, ..] => Err(CliError::Usage(format!("unexpected argument '{extra}'"))),
    }
}

fn parse_dump_options(args: &[String]) -> Result<DumpOptions, CliError> {
    let mut pretty = false;
    let mut file = None;

    for arg in args {
        match arg.as_str() {
            "--pretty" => pretty = true,
            option if option.starts_with("--") => {
                return Err(CliError::Usage(format!("unknown option '{option}'")));
            }
            path if file.is_none() => file = Some(PathBuf::from(path)),
            extra => return Err(CliError::Usage(format!("unexpected argument '{extra}'"))),
        }
    }

    let file = file.ok_or_else(|| CliError::Usage("dump requires an input file".to_string()))?;
    Ok(DumpOptions { file, pretty })
}

fn print_usage() {
    eprintln!("usage:");
    eprintln!("  rigid-yaml check <file>            check type-independent document restrictions");
    eprintln!("  rigid-yaml dump [--pretty] <file>  print the parsed node tree as JSON");
}

#[cfg(test)]
mod tests {
    use super::{parse_check_options, parse_dump_options, CliError, DumpOptions};
    use std::path::PathBuf;

    fn args(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn parse_dump_pretty_before_file() {
        let options = parse_dump_options(&args(&["--pretty", "config.yaml"])).unwrap();
        assert_eq!(
            options,
            DumpOptions {
                file: PathBuf::from("config.yaml"),
                pretty: true,
            }
        );
    }

    #[test]
    fn parse_dump_defaults_to_compact() {
        let options = parse_dump_options(&args(&["config.yaml"])).unwrap();
        assert!(!options.pretty);
    }

    #[test]
    fn parse_dump_rejects_unknown_option() {
        let err = parse_dump_options(&args(&["--yaml", "config.yaml"])).unwrap_err();
        assert!(matches!(err, CliError::Usage(message) if message == "unknown option '--yaml'"));
    }

    #[test]
    fn parse_dump_requires_file() {
        let err = parse_dump_options(&args(&["--pretty"])).unwrap_err();
        assert!(matches!(err, CliError::Usage(_)));
    }

    #[test]
    fn parse_check_takes_exactly_one_file() {
        assert_eq!(
            parse_check_options(&args(&["a.yaml"])).unwrap(),
            PathBuf::from("a.yaml")
        );
        assert!(parse_check_options(&args(&[])).is_err());
        assert!(parse_check_options(&args(&["a.yaml", "b.yaml"])).is_err());
    }
}
