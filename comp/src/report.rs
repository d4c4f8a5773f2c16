use codespan_reporting::{
    diagnostic::{Diagnostic, Label, Severity},
    files::Files,
    term::{self, termcolor::ColorChoice, termcolor::StandardStream},
};
use comp_lib::diagnostic::{self, AggregateResult, Code, DiagnosticKind};
use is_terminal::IsTerminal;

fn config() -> term::Config {
    term::Config {
        chars: term::Chars {
            single_primary_caret: '─',
            multi_primary_caret_start: '╯',
            multi_primary_caret_end: '╯',
            ..term::Chars::box_drawing()
        },
        ..Default::default()
    }
}

fn to_codespan(kind: DiagnosticKind, d: &diagnostic::Diagnostic) -> Diagnostic<()> {
    let severity = match kind {
        DiagnosticKind::Rec => Severity::Warning,
        DiagnosticKind::Err => Severity::Error,
    };
    let mut report = Diagnostic::new(severity).with_message(d.message());

    // Backend diagnostics have no place in the source.
    if let Some(span) = d.main_span() {
        report = report.with_labels(vec![Label::primary((), *span)]);
    }
    if *d.code() != Code::Unspecified {
        report = report.with_code(d.code().to_string());
    }
    report
}

/// Prints every diagnostic of `aggregate` to std err, colored when it is a terminal.
pub fn eprint_aggregate<'files, T, F>(aggregate: &AggregateResult<T>, files: &'files F)
where
    F: Files<'files, FileId = ()>,
{
    let color = match std::io::stderr().is_terminal() {
        true => ColorChoice::Auto,
        false => ColorChoice::Never,
    };
    let mut writer = StandardStream::stderr(color);
    let config = config();

    for (kind, d) in aggregate.diagnostics() {
        if let Err(error) = term::emit(&mut writer, &config, files, &to_codespan(kind, d)) {
            eprintln!("failed to print a diagnostic: {error}");
        }
    }
}
