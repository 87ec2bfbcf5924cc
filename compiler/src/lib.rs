// sigc — Signal instruction compiler
//
// Library root. Front end (lexer, parser, resolve), the signal graph and its
// collaborators, and the common-subexpression splitting pass.

pub mod ast;
pub mod context;
pub mod diag;
pub mod id;
pub mod lexer;
pub mod occurrences;
pub mod parser;
pub mod pass;
pub mod pipeline;
pub mod property;
pub mod resolve;
pub mod rewrite;
pub mod sig;
pub mod split;
pub mod types;
