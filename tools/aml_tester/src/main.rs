/*
 * This is a small program for testing the tree library against real AML. We want to:
 *      - scan a directory for ASL files
 *      - compile them using `iasl` into AML files (these should be gitignored), but only if the ASL file has a
 *        newer timestamp than the AML file (or just compile if there isn't a corresponding AML file)
 *      - parse each AML file into a tree, serialize the tree again, and check that we get back exactly the bytes
 *        we started with
 *      - print a summary of which files passed, like `cargo test` does
 */

use aml_tree::{parse_definition_block, AmlError, DebugVerbosity, ParseOptions};
use clap::{Arg, ArgAction, ArgGroup};
use std::{
    collections::BTreeMap,
    ffi::OsStr,
    fs,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
};

enum CompilationOutcome {
    Ignored,
    IsAml(PathBuf),
    Newer(PathBuf),
    NotCompiled(PathBuf),
    Failed(PathBuf),
    Succeeded(PathBuf),
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum TestResult {
    Pass,
    /// `iasl` failed to compile the ASL.
    CompileFail,
    /// `iasl` isn't available, and there was no AML to test.
    NotCompiled,
    ParseFail,
    /// The tree parsed, but serializing it again didn't give back the original table.
    RoundTripFail,
}

fn main() -> std::io::Result<()> {
    let mut cmd = clap::Command::new("aml_tester")
        .version("v0.1.0")
        .about("Compiles ASL files, and checks that they survive a trip through an AML tree")
        .arg(Arg::new("no_compile").long("no-compile").action(ArgAction::SetTrue).help("Don't compile ASL to AML"))
        .arg(Arg::new("dump").long("dump").action(ArgAction::SetTrue).help("Print the tree of each file"))
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .help("Trace the parser (repeat for more detail)"),
        )
        .arg(Arg::new("path").short('p').long("path").required(false).action(ArgAction::Set).value_name("DIR"))
        .arg(
            Arg::new("files")
                .action(ArgAction::Append)
                .value_name("FILE.{asl,aml}")
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .group(ArgGroup::new("files_list").args(["path", "files"]).required(true));
    if std::env::args().count() <= 1 {
        cmd.print_help()?;
        return Ok(());
    }

    let matches = cmd.get_matches();

    let verbosity = match matches.get_count("verbose") {
        0 => DebugVerbosity::None,
        1 => DebugVerbosity::Scopes,
        2 => DebugVerbosity::AllScopes,
        _ => DebugVerbosity::All,
    };
    if log::set_logger(&Logger).is_ok() {
        log::set_max_level(if verbosity == DebugVerbosity::None {
            log::LevelFilter::Info
        } else {
            log::LevelFilter::Trace
        });
    }

    // Make sure we have the ability to compile ASL -> AML, if user wants it
    let user_wants_compile = !matches.get_flag("no_compile");
    let can_compile = user_wants_compile
        && match Command::new("iasl").arg("-v").status() {
            Ok(exit_status) if exit_status.success() => true,
            Ok(exit_status) => {
                eprintln!("`iasl` exited with unsuccessful status: {:?}", exit_status);
                false
            }
            Err(_) => false,
        };

    let tests = find_tests(&matches)?;
    let compiled_files =
        tests.iter().map(|path| resolve_and_compile(path, can_compile)).collect::<std::io::Result<Vec<_>>>()?;

    if user_wants_compile
        && !can_compile
        && compiled_files.iter().any(|outcome| matches!(outcome, CompilationOutcome::NotCompiled(_)))
    {
        eprintln!("`iasl` is not installed, but some ASL files need compiling! Pass --no-compile, or install `iasl`");
    }

    if user_wants_compile {
        let (passed, failed) = compiled_files.iter().fold((0, 0), |(passed, failed), outcome| match outcome {
            CompilationOutcome::Succeeded(_) => (passed + 1, failed),
            CompilationOutcome::Failed(_) => (passed, failed + 1),
            _ => (passed, failed),
        });
        if passed + failed > 0 {
            println!(
                "Compiled {} ASL files: {}{} passed{}, {}{} failed{}",
                passed + failed,
                termion::color::Fg(termion::color::Green),
                passed,
                termion::style::Reset,
                termion::color::Fg(termion::color::Red),
                failed,
                termion::style::Reset
            );
            println!();
        }
    }

    // Keyed on path, which also drops files we've been given more than once
    let mut summaries: BTreeMap<PathBuf, TestResult> = BTreeMap::new();
    let mut aml_files = Vec::new();
    for outcome in compiled_files {
        match outcome {
            CompilationOutcome::IsAml(path)
            | CompilationOutcome::Newer(path)
            | CompilationOutcome::Succeeded(path) => {
                if !aml_files.contains(&path) {
                    aml_files.push(path);
                }
            }
            CompilationOutcome::Failed(path) => {
                summaries.insert(path, TestResult::CompileFail);
            }
            CompilationOutcome::NotCompiled(path) => {
                summaries.insert(path, TestResult::NotCompiled);
            }
            CompilationOutcome::Ignored => (),
        }
    }

    let options = ParseOptions { verbosity, ..ParseOptions::default() };
    let dump = matches.get_flag("dump");

    for file in aml_files {
        print!("Testing AML file: {:?}... ", file);
        std::io::stdout().flush()?;

        let contents = fs::read(&file)?;
        let result = match run_test(&contents, &options, dump) {
            Ok(()) => {
                println!("{}OK{}", termion::color::Fg(termion::color::Green), termion::style::Reset);
                TestResult::Pass
            }
            Err(TestFailure::Parse(err)) => {
                println!("{}Failed ({:?}){}", termion::color::Fg(termion::color::Red), err, termion::style::Reset);
                TestResult::ParseFail
            }
            Err(TestFailure::Mismatch { offset, expected, got }) => {
                println!(
                    "{}Failed (round trip differs at offset {:#x}: expected {:02x?}, got {:02x?}){}",
                    termion::color::Fg(termion::color::Red),
                    offset,
                    expected,
                    got,
                    termion::style::Reset
                );
                TestResult::RoundTripFail
            }
        };
        summaries.insert(file, result);
    }

    println!("Summary:");
    for (file, status) in summaries.iter() {
        let status = match status {
            TestResult::Pass => {
                format!("{}OK{}", termion::color::Fg(termion::color::Green), termion::style::Reset)
            }
            TestResult::CompileFail => {
                format!("{}COMPILE FAIL{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
            TestResult::NotCompiled => {
                format!("{}NOT COMPILED{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
            TestResult::ParseFail => {
                format!("{}PARSE FAIL{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
            TestResult::RoundTripFail => {
                format!("{}ROUND TRIP FAIL{}", termion::color::Fg(termion::color::Red), termion::style::Reset)
            }
        };
        println!("\t{:<50}: {}", file.display(), status);
    }

    let passed = summaries.values().filter(|result| **result == TestResult::Pass).count();
    println!(
        "\nTest results: {}{} passed{}, {}{} failed{}",
        termion::color::Fg(termion::color::Green),
        passed,
        termion::style::Reset,
        termion::color::Fg(termion::color::Red),
        summaries.len() - passed,
        termion::style::Reset
    );
    Ok(())
}

enum TestFailure {
    Parse(AmlError),
    Mismatch { offset: usize, expected: Option<u8>, got: Option<u8> },
}

fn run_test(table: &[u8], options: &ParseOptions, dump: bool) -> Result<(), TestFailure> {
    let (mut tree, root) = parse_definition_block(table, options).map_err(TestFailure::Parse)?;
    if dump {
        println!();
        print!("{}", tree.display(root));
    }

    let serialized = tree.serialize_definition_block(root).map_err(TestFailure::Parse)?;
    let result = match serialized.iter().zip(table.iter()).position(|(got, expected)| got != expected) {
        Some(offset) => {
            Err(TestFailure::Mismatch { offset, expected: Some(table[offset]), got: Some(serialized[offset]) })
        }
        None if serialized.len() != table.len() => {
            let offset = usize::min(serialized.len(), table.len());
            Err(TestFailure::Mismatch {
                offset,
                expected: table.get(offset).copied(),
                got: serialized.get(offset).copied(),
            })
        }
        None => Ok(()),
    };

    tree.delete_tree(root).map_err(TestFailure::Parse)?;
    result
}

fn find_tests(matches: &clap::ArgMatches) -> std::io::Result<Vec<PathBuf>> {
    let files: Vec<PathBuf> = match matches.get_one::<String>("path") {
        Some(path) => {
            let dir_path = Path::new(path);
            if fs::metadata(dir_path)?.is_dir() {
                println!("Running tests in directory: {:?}", dir_path);
                let mut files = fs::read_dir(dir_path)?
                    .filter_map(|entry| entry.ok().map(|entry| entry.path()))
                    .collect::<Vec<_>>();
                files.sort();
                files
            } else {
                println!("Running single test: {:?}", dir_path);
                vec![dir_path.to_path_buf()]
            }
        }
        None => matches.get_many::<PathBuf>("files").unwrap_or_default().cloned().collect(),
    };

    // Make sure all files exist, propagate error if it occurs
    for path in files.iter() {
        if !path.is_file() {
            println!("Not a regular file: {}", path.display());
            path.metadata()?;
        }
    }

    Ok(files)
}

/// Determine what to do with this file - ignore, compile and parse, or just parse.
/// If ".aml" does not exist, or if ".asl" is newer, compiles the file.
/// If the ".aml" file is newer, indicate it is ready to parse.
fn resolve_and_compile(path: &PathBuf, can_compile: bool) -> std::io::Result<CompilationOutcome> {
    if path.extension() == Some(OsStr::new("aml")) && path.metadata()?.is_file() {
        return Ok(CompilationOutcome::IsAml(path.clone()));
    }

    if path.extension() != Some(OsStr::new("asl")) || !path.metadata()?.is_file() {
        return Ok(CompilationOutcome::Ignored);
    }

    let aml_path = path.with_extension("aml");

    if aml_path.is_file() {
        let asl_last_modified = path.metadata()?.modified()?;
        let aml_last_modified = aml_path.metadata()?.modified()?;
        if asl_last_modified <= aml_last_modified {
            return Ok(CompilationOutcome::Newer(aml_path));
        }
    }

    if !can_compile {
        return Ok(CompilationOutcome::NotCompiled(path.clone()));
    }

    println!("Compiling file: {}", path.display());
    let output = Command::new("iasl").arg(path).output()?;

    if !output.status.success() {
        println!(
            "Failed to compile ASL file: {}. Output from iasl:\n {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok(CompilationOutcome::Failed(path.clone()))
    } else {
        Ok(CompilationOutcome::Succeeded(aml_path))
    }
}

struct Logger;

impl log::Log for Logger {
    fn enabled(&self, _: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        println!("[{}] {}", record.level(), record.args());
    }

    fn flush(&self) {
        let _ = std::io::stdout().flush();
    }
}
