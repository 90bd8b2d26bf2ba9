//! Many small operational tasks behind one command line.
//!
//! An embedding program registers named *actions* in a [`Registry`], describes
//! its program-wide flags with a [`ParserFactory`] and hands both to a
//! [`Dispatcher`]. A command line such as
//!
//! ```text
//! act -v _dry_run kubectl get pods --watch
//! ```
//!
//! runs `_dry_run` and then `kubectl`, in that order. Because `kubectl` is
//! registered as owning the remaining args, everything after its token
//! (`get pods --watch`) is handed to it verbatim instead of being parsed by
//! the shared grammar.
//!
//! ```
//! use cli_actions::{ActionDescriptor, Dispatcher, FlagSpec, ParserFactory, Registry};
//! use std::io::Write;
//!
//! let mut registry = Registry::with_builtins();
//! registry.register(
//!     ActionDescriptor::new("greet")
//!         .owns_remaining_args()
//!         .executor(|ctx| {
//!             let names = ctx.read_unparsed();
//!             writeln!(ctx.out(), "hello {}", names.join(" "))?;
//!             Ok(())
//!         }),
//! );
//! let factory = ParserFactory::new("act").global(FlagSpec::switch("verbose").short('v'));
//!
//! let mut out = Vec::new();
//! let outcome = Dispatcher::new(&registry, &factory)
//!     .run(&["-v", "greet", "ann", "bob"], &mut out)
//!     .unwrap();
//! assert_eq!(outcome.executed, ["greet"]);
//! assert_eq!(String::from_utf8(out).unwrap(), "hello ann bob\n");
//! ```

pub mod action;
pub mod builtin;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod error;
pub mod flags;
pub mod parser;
pub mod registry;
pub mod runner;

pub use action::{ActionDescriptor, ActionInfo, Executor, ParsedTail, PrivateParser};
pub use builtin::BuiltinAction;
pub use context::ExecutionContext;
pub use dispatch::{Dispatcher, Outcome, Resolution};
pub use env::{Environment, load_env_file};
pub use error::{DispatchError, EnvFileError};
pub use flags::{FlagSet, FlagSpec, OptionValues};
pub use parser::{ParserFactory, SharedParser};
pub use registry::Registry;
pub use runner::{CommandRunner, DryRunRunner, ExitCode, Invocation, ProcessRunner};
