//! Generic C frontend: lexer, preparser, token stack, AST, parser,
//! scope/result-file, resolver, typechecker, monomorphizer and
//! monomorphizing C emitter (see `SPEC_FULL.md` at the workspace root).
//!
//! The external surface (§6) is the three free functions at the bottom of
//! this module: [`parse`], [`typecheck`] and [`generate`]. Everything else
//! is exposed mainly so the integration tests under `tests/` can drive the
//! pipeline stage by stage.

pub mod ast;
pub mod config;
pub mod diag;
pub mod emitter;
pub mod monomorphizer;
pub mod parser;
pub mod preparser;
pub mod resolver;
pub mod scanner;
pub mod scope;
pub mod source;
pub mod token;
pub mod token_stream;
pub mod typechecker;

use std::path::Path;

use config::Config;
use diag::DiagnosticSink;
use scope::ResultFile;
use source::SourceFile;
use token_stream::{MacroTable, TokenStream};

/// §6 `parse(file, config) -> ResultFile`: scan, preparse and parse one
/// translation unit. Lexical/syntactic errors are pushed to `sink`; the
/// scanner and parser recover and keep producing a best-effort AST (§7).
#[must_use] pub fn parse(file: &SourceFile, config: &Config, sink: &mut DiagnosticSink) -> ResultFile {
  let scanned = scanner::Scanner::new(file, config).scan(sink);
  if config.dump_scanner {
    for tok in &scanned { log::debug!("{:?}", tok.kind); }
  }
  let grouped = preparser::Preparser::new(sink).run(scanned);
  let stream = TokenStream::new(grouped, MacroTable::new());
  let mut result = ResultFile::new(file.name);
  let mut p = parser::Parser::new(stream, sink, *config);
  p.parse_translation_unit(&mut result);
  result
}

/// §6 `typecheck(result_file)`: walk every global declaration whose
/// generics are fully instantiated, mutating only `sink`.
pub fn typecheck(result: &ResultFile, sink: &mut DiagnosticSink) {
  typechecker::Typechecker::new(result).check_all(sink);
}

/// §6 `generate(result) -> writes outputs`: monomorphize on demand while
/// walking declarations, and write one `.c` file per translation unit
/// under `out_dir`. Returns the path written.
pub fn generate(
  result: &mut ResultFile,
  out_dir: &Path,
  config: &Config,
  sink: &mut DiagnosticSink,
) -> std::io::Result<std::path::PathBuf> {
  std::fs::create_dir_all(out_dir)?;
  let source = emitter::Emitter::new(result, config, sink).emit_translation_unit();
  let mut out_path = out_dir.join(result.filename.as_str());
  out_path.set_extension("c");
  std::fs::write(&out_path, source)?;
  Ok(out_path)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn end_to_end_simple_function() {
    let file = SourceFile::new("add.c", "int add(int a, int b) { return a + b; }");
    let mut sink = DiagnosticSink::new();
    let config = Config::default();
    let mut result = parse(&file, &config, &mut sink);
    assert!(sink.is_empty(), "{sink:?}");
    typecheck(&result, &mut sink);
    assert!(sink.is_empty(), "{sink:?}");
    let dir = tempfile::tempdir().unwrap();
    let path = generate(&mut result, dir.path(), &config, &mut sink).unwrap();
    let text = std::fs::read_to_string(path).unwrap();
    assert!(text.contains("int add(int a, int b);"));
    assert!(text.contains("int add(int a, int b)\n{"));
  }
}
