use super::{Code, Diagnostic, Span};
use viper_il::ParseError;

pub struct DiagnosticBuilder {
    span: Option<Span>,
}

impl DiagnosticBuilder {
    pub fn new(span: impl Into<Span>) -> Self {
        Self {
            span: Some(span.into()),
        }
    }

    /// For diagnostics that can't be tied to a place in the source, like the ones the backend
    /// passes report.
    pub fn unspanned() -> Self {
        Self { span: None }
    }

    pub fn build_custom(self, code: Code, message: String) -> Diagnostic {
        Diagnostic {
            code,
            message,
            main_span: self.span,
        }
    }

    /// Builds the diagnostic for a failed parse. The span of the builder is ignored in favor of
    /// the one carried by the error.
    pub fn build_parse_error(self, error: &ParseError) -> Diagnostic {
        let code = match error {
            ParseError::InvalidToken { .. }
            | ParseError::Unexpected { .. }
            | ParseError::UnexpectedEof { .. }
            | ParseError::UnknownType { .. } => Code::SyntaxError,
            ParseError::UnknownOpcode { .. } => Code::UnknownOpcode,
            ParseError::UnexpectedResult { .. }
            | ParseError::DuplicateTemp { .. }
            | ParseError::UndefinedTemp { .. } => Code::MalformedIl,
        };
        Self::new(error.span()).build_custom(code, error.to_string())
    }

    pub fn build_malformed_il(self, message: impl Into<String>) -> Diagnostic {
        self.build_custom(Code::MalformedIl, message.into())
    }

    pub fn build_unreachable_block(self, function: &str, block: &str) -> Diagnostic {
        self.build_custom(
            Code::UnreachableBlock,
            format!("block `{block}` in `@{function}` is never reached"),
        )
    }
}
