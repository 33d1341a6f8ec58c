/*
 * main.rs
 *
 * sc-selftest: run one lifecycle scenario against the process-wide
 * runtime and let the outcome show in the exit status and the streams.
 * The integration tests drive this binary; aborts cannot be observed
 * from inside a test process.
 *
 * Scenarios that end in an abort never return from run_main().
 */

use std::sync::Arc;

use sc_runtime::comm::{Communicator, MPI_SUCCESS};
use sc_runtime::error::exit_codes;
use sc_runtime::global;
use sc_runtime::io::eprint_str;
use sc_runtime::{
    AbortHandler, InitConfig, LogThreshold, PackageId, Priority, sc_abort, sc_assert,
    sc_check_mpi, sc_global_debug, sc_global_info, sc_global_production, sc_global_verbose,
};

const USAGE: &str = "\
usage: sc-selftest <scenario>

scenarios:
  ok                    init, allocate, log, finalize
  abort <message>       abort with a message
  unregister-unknown    unregister an id that was never registered
  duplicate-name        register the same package name twice
  set-threshold-unknown set the threshold of an unregistered id
  leak                  unregister a package that still owns memory
  double-init           call init twice
  finalize-only         finalize without init
  finalize-leak         finalize while the built-in package holds memory
  signal <INT|SEGV|USR2>  raise a caught signal
  collective            abort with a communicator attached
  collective-trace      fail to open the trace file with a communicator attached
  abort-collective      collective abort from the lead rank
  alloc-fail            request an impossible allocation
  check-mpi             fail an MPI return-code check
  assert                fail a debug assertion
  reentrant             abort again from inside the abort handler
  handler-reenters      abort handler that logs through the runtime
  backtrace             abort with backtraces enabled
  trace                 log into a trace file set by SC_TRACE_FILE
";

/* single-process stand-in for an MPI communicator */
struct LoopbackComm;

impl Communicator for LoopbackComm {
    fn rank(&self) -> i32 {
        0
    }

    fn barrier(&self) -> i32 {
        MPI_SUCCESS
    }

    fn abort(&self, errorcode: i32) {
        eprint_str(&format!("collective abort requested: errorcode {errorcode}\n"));
    }
}

/* abort handler that fails in turn */
struct AbortAgain;

impl AbortHandler for AbortAgain {
    fn handle_abort(&self) {
        global::abort_verbose(file!(), line!(), format_args!("second abort"))
    }
}

fn main() {
    std::process::exit(i32::from(run_main()));
}

fn run_main() -> u8 {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let scenario = args.first().map(String::as_str);
    let arg = args.get(1).map(String::as_str);

    match (scenario, arg) {
        (Some("ok"), None) => ok(),
        (Some("abort"), Some(message)) => {
            global::init(InitConfig::default());
            sc_abort!("{message}")
        }
        (Some("unregister-unknown"), None) => {
            global::init(InitConfig::default());
            global::unregister(PackageId::from_raw(42));
            exit_codes::SUCCESS
        }
        (Some("duplicate-name"), None) => {
            global::init(InitConfig::default());
            global::register(None, LogThreshold::Default, "twice", "First registration");
            global::register(None, LogThreshold::Default, "twice", "Second registration");
            exit_codes::SUCCESS
        }
        (Some("set-threshold-unknown"), None) => {
            global::init(InitConfig::default());
            global::set_package_log_threshold(
                PackageId::from_raw(7),
                LogThreshold::Explicit(Priority::Debug),
            );
            exit_codes::SUCCESS
        }
        (Some("leak"), None) => leak(),
        (Some("double-init"), None) => {
            global::init(InitConfig::default());
            global::init(InitConfig::default());
            exit_codes::SUCCESS
        }
        (Some("finalize-only"), None) => {
            global::finalize();
            println!("finalized");
            exit_codes::SUCCESS
        }
        (Some("finalize-leak"), None) => {
            global::init(InitConfig::default());
            let _ = global::allocate(PackageId::SC, 8);
            global::finalize();
            println!("finalized");
            exit_codes::SUCCESS
        }
        (Some("signal"), Some(name)) => raise(name),
        (Some("collective"), None) => {
            global::init(InitConfig {
                comm: Some(Arc::new(LoopbackComm)),
                ..InitConfig::default()
            });
            sc_abort!("boom")
        }
        (Some("collective-trace"), None) => {
            /* SC_TRACE_FILE points somewhere that cannot be created */
            global::init(InitConfig {
                comm: Some(Arc::new(LoopbackComm)),
                ..InitConfig::default()
            });
            println!("not reached");
            exit_codes::SUCCESS
        }
        (Some("abort-collective"), None) => {
            global::init(InitConfig {
                comm: Some(Arc::new(LoopbackComm)),
                ..InitConfig::default()
            });
            global::abort_collective("lead rank says stop")
        }
        (Some("alloc-fail"), None) => {
            global::init(InitConfig::default());
            let _ = global::allocate(PackageId::SC, usize::MAX);
            exit_codes::SUCCESS
        }
        (Some("check-mpi"), None) => {
            global::init(InitConfig::default());
            sc_check_mpi!(3);
            exit_codes::SUCCESS
        }
        (Some("assert"), None) => {
            global::init(InitConfig::default());
            sc_assert!(1 + 1 == 3);
            println!("assertion skipped");
            exit_codes::SUCCESS
        }
        (Some("reentrant"), None) => {
            global::init(InitConfig::default());
            global::set_abort_handler(Some(Arc::new(AbortAgain)));
            sc_abort!("first abort")
        }
        (Some("handler-reenters"), None) => {
            global::init(InitConfig::default());
            global::set_abort_handler(Some(Arc::new(|| {
                sc_global_production!("abort handler ran on rank {}", global::rank());
            })));
            global::unregister(PackageId::from_raw(42));
            exit_codes::SUCCESS
        }
        (Some("backtrace"), None) => {
            global::init(InitConfig {
                print_backtrace: true,
                ..InitConfig::default()
            });
            sc_abort!("with backtrace")
        }
        (Some("trace"), None) => trace(),
        _ => {
            eprint_str(USAGE);
            exit_codes::USAGE
        }
    }
}

fn ok() -> u8 {
    global::init(InitConfig {
        catch_signals: true,
        ..InitConfig::default()
    });

    let demo = global::register(None, LogThreshold::Default, "demo", "Self-test package");
    let block = global::allocate(demo, 64);
    let name = global::duplicate_string(demo, "selftest");
    // SAFETY: both blocks came from the global allocator and are released once.
    unsafe {
        global::release(demo, Some(name));
        global::release(demo, Some(block));
    }
    global::memory_check(demo);

    sc_global_production!("allocated and released under package {demo}");
    global::print_summary(Priority::Production);
    global::unregister(demo);
    global::finalize();

    println!("selftest ok");
    exit_codes::SUCCESS
}

fn leak() -> u8 {
    global::init(InitConfig::default());
    let leaky = global::register(None, LogThreshold::Default, "leaky", "Leaking package");
    let _ = global::allocate(leaky, 100);
    global::unregister(leaky);
    println!("survived");
    global::finalize();
    exit_codes::SUCCESS
}

fn raise(name: &str) -> u8 {
    let sig = match name.to_ascii_uppercase().trim_start_matches("SIG") {
        "INT" => libc::SIGINT,
        "SEGV" => libc::SIGSEGV,
        "USR2" => libc::SIGUSR2,
        _ => {
            eprint_str(USAGE);
            return exit_codes::USAGE;
        }
    };

    global::init(InitConfig {
        catch_signals: true,
        ..InitConfig::default()
    });
    // SAFETY: raise() with a valid signal number has no other preconditions.
    unsafe {
        libc::raise(sig);
    }
    println!("not reached");
    exit_codes::SUCCESS
}

fn trace() -> u8 {
    global::init(InitConfig {
        log_threshold: LogThreshold::Explicit(Priority::Info),
        ..InitConfig::default()
    });
    sc_global_debug!("below both thresholds");
    sc_global_verbose!("trace only");
    sc_global_info!("both sinks");
    global::finalize();
    exit_codes::SUCCESS
}
