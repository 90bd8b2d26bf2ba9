use anyhow::{Context, Result, bail};
use argh::FromArgs;
use cli_actions::{
    ActionDescriptor, BuiltinAction, DispatchError, Dispatcher, ExecutionContext, ExitCode,
    FlagSet, FlagSpec, Invocation, ParserFactory, Registry, load_env_file,
};
use std::io::Write;
use tracing_subscriber::EnvFilter;

fn main() -> std::process::ExitCode {
    let argv: Vec<String> = std::env::args().skip(1).collect();
    let registry = registry();
    let factory = parser_factory();
    let dispatcher = Dispatcher::new(&registry, &factory);

    let resolution = dispatcher.resolve(&argv);
    init_tracing(
        resolution
            .as_ref()
            .is_ok_and(|resolution| resolution.globals.flag("verbose")),
    );

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let result = resolution.and_then(|resolution| {
        let outcome = dispatcher.run_resolved(resolution, &mut out)?;
        if !outcome.silent {
            writeln!(out, "finished")?;
        }
        Ok(())
    });
    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(err) => {
            match &err {
                DispatchError::Usage { message } => eprintln!("{}", message.trim_end()),
                _ => eprintln!("error: {err}"),
            }
            std::process::ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn parser_factory() -> ParserFactory {
    ParserFactory::new("act")
        .about("Run independent operational tasks from one entry point")
        .global(
            FlagSpec::switch("verbose")
                .short('v')
                .help("log what the dispatcher does"),
        )
        .global(
            FlagSpec::value("env-file")
                .short('e')
                .help("KEY=VALUE file merged into the environment of launched commands"),
        )
        .global(
            FlagSpec::value("namespace")
                .short('n')
                .default_value("default")
                .help("kubernetes namespace for the kubectl action"),
        )
        .default_actions(["_help"])
}

fn registry() -> Registry {
    let mut registry = Registry::with_builtins();
    registry
        .register_fn(
            ActionDescriptor::new("kubectl")
                .alias("k8")
                .about("run kubectl with the env file applied and the namespace pinned")
                .owns_remaining_args(),
            kubectl,
        )
        .register_fn(
            ActionDescriptor::new("exec")
                .alias("x")
                .about("run an arbitrary program with the env file applied")
                .owns_remaining_args(),
            exec,
        )
        .register_fn(
            ActionDescriptor::new("show-env")
                .about("print the variables of the env file, or a single one")
                .owns_remaining_args()
                .private_parser(
                    FlagSet::new().flag(
                        FlagSpec::value("key")
                            .short('k')
                            .help("print only this variable"),
                    ),
                ),
            show_env,
        )
        .register_builtin::<Echo>()
        .register_fn(
            ActionDescriptor::new("version")
                .about("print the version and stop")
                .terminal()
                .silent(),
            |ctx| {
                writeln!(ctx.out(), "act {}", env!("CARGO_PKG_VERSION"))?;
                Ok(())
            },
        );
    registry
}

fn merge_env_file(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    if let Some(path) = ctx.global_options().value("env-file").map(str::to_owned) {
        ctx.env
            .merge_file(&path)
            .with_context(|| format!("loading env file {path}"))?;
    }
    Ok(())
}

fn check_status(program: &str, code: ExitCode) -> Result<()> {
    if code != 0 {
        bail!("{program} exited with status {code}");
    }
    Ok(())
}

fn kubectl(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    merge_env_file(ctx)?;
    let namespace = ctx
        .global_options()
        .value("namespace")
        .unwrap_or("default")
        .to_owned();
    let invocation = Invocation::new("kubectl")
        .args(ctx.read_unparsed())
        .args(["-n".to_owned(), namespace]);
    let code = ctx.run(&invocation)?;
    check_status("kubectl", code)
}

fn exec(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    merge_env_file(ctx)?;
    let mut args = ctx.read_unparsed().into_iter();
    let Some(program) = args.next() else {
        bail!("exec needs a program to run");
    };
    let code = ctx.run(&Invocation::new(program.clone()).args(args))?;
    check_status(&program, code)
}

fn show_env(ctx: &mut ExecutionContext<'_>) -> Result<()> {
    let Some(path) = ctx.global_options().value("env-file").map(str::to_owned) else {
        bail!("show-env needs --env-file");
    };
    let vars = load_env_file(&path)?;
    let key = ctx.private_options().value("key").map(str::to_owned);
    let out = ctx.out();
    match key {
        Some(key) => match vars.get(&key) {
            Some(value) => writeln!(out, "{value}")?,
            None => bail!("{key} is not set in {path}"),
        },
        None => {
            let mut pairs: Vec<_> = vars.into_iter().collect();
            pairs.sort();
            for (key, value) in pairs {
                writeln!(out, "{key}={value}")?;
            }
        }
    }
    Ok(())
}

#[derive(FromArgs)]
/// Print words separated by spaces.
struct Echo {
    #[argh(switch, short = 'n')]
    /// don't end the line.
    no_newline: bool,

    #[argh(switch, short = 's')]
    /// replace `$NAME` words with variables from the environment and env file.
    substitute: bool,

    #[argh(positional, greedy)]
    /// words to print.
    words: Vec<String>,
}

impl BuiltinAction for Echo {
    fn name() -> &'static str {
        "echo"
    }

    fn about() -> &'static str {
        "print the arguments, optionally with variables substituted"
    }

    fn owns_remaining_args() -> bool {
        true
    }

    fn execute(self, ctx: &mut ExecutionContext<'_>) -> Result<()> {
        if self.substitute {
            merge_env_file(ctx)?;
        }
        let words: Vec<&str> = self
            .words
            .iter()
            .map(|word| match word.strip_prefix('$') {
                Some(name) if self.substitute => ctx.env.get_var(name).unwrap_or(""),
                _ => word.as_str(),
            })
            .collect();
        let line = words.join(" ");
        if self.no_newline {
            write!(ctx.out(), "{line}")?;
        } else {
            writeln!(ctx.out(), "{line}")?;
        }
        Ok(())
    }
}
