#![doc = include_str!("../../../README.md")]
mod args;
mod bridge;
mod builtins;
mod classify;
mod completion;
mod config;
mod context;
mod exception;
mod executor;
mod expressions;
mod host;
mod interp;
mod io;
mod methods;
mod namespace;
mod ops;
mod parse;
mod session;
mod splitter;
mod value;

pub use crate::{
    bridge::{Bridge, ServeSummary},
    classify::{BatchError, Diagnostic, ErrorKind},
    completion::{CompletionResult, is_internal_name},
    config::{DEFAULT_MAX_RECURSION_DEPTH, SessionConfig},
    exception::{ExcType, Exception, StackFrame},
    executor::ExecutionOutcome,
    host::{
        CompletionRequest, ContextHost, HostChannel, HostFault, HostRequest, HostValue, MemoryContextHost,
        ParamOption, StatementBatch, TransportError,
    },
    io::{CollectOutput, NoOutput, OutputSink},
    namespace::Namespace,
    parse::{ParseError, SourceFile, SyntaxUnit, parse_units},
    session::Session,
    splitter::clean_batch,
    value::Introspectable,
};
