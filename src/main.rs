use clap::{Parser, Subcommand};
use cloudsync_lib::commands::dispatch;
use cloudsync_lib::config::resolve_config_dir;
use cloudsync_lib::logging::{get_log_dir, LogConfig, SizeRotatingWriter};
use cloudsync_lib::AppState;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tokio_stream::StreamExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::filter::Directive;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "cloudsync", version, about = "本地目录与云端文档存储的单文件双向同步")]
struct Cli {
    /// 配置目录（默认使用系统配置目录下的 cloudsync）
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// 调用一个同步方法，结果以 JSON 输出
    Call {
        /// 方法名，例如 syncFile、downloadFile、getDiagnostics
        method: String,
        /// 文件名
        #[arg(long)]
        file: Option<String>,
        /// 冲突解决方式: useLocal | useRemote
        #[arg(long)]
        resolution: Option<String>,
        /// 其它 JSON 参数，例如 '{"level":"debug"}'
        #[arg(long)]
        args: Option<String>,
    },
    /// 持续输出同步事件（每行一个 JSON）
    Watch,
}

/// 初始化日志系统
fn init_logging(config_dir: &Path) {
    let config = LogConfig::load(config_dir);

    if !config.enabled {
        // 日志已禁用，只初始化一个空的 subscriber
        let _ = tracing::subscriber::set_global_default(tracing_subscriber::registry());
        return;
    }

    // 创建日志级别过滤器
    let mut env_filter = EnvFilter::from_default_env().add_directive(config.tracing_level().into());
    for directive in ["opendal=warn", "hyper=warn", "reqwest=warn"] {
        if let Ok(d) = directive.parse::<Directive>() {
            env_filter = env_filter.add_directive(d);
        }
    }

    let log_dir = get_log_dir(config_dir);
    match SizeRotatingWriter::new(&log_dir, config.max_size_mb) {
        Ok(file_writer) => {
            // 文件日志层 - 始终输出到文件
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false);

            // 在 debug 模式下也输出到控制台（stderr，避免混入命令输出）
            #[cfg(debug_assertions)]
            {
                let console_layer = tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false);

                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer)
                    .with(console_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }

            #[cfg(not(debug_assertions))]
            {
                let subscriber = tracing_subscriber::registry()
                    .with(env_filter)
                    .with(file_layer);
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
        Err(e) => {
            // 文件日志创建失败，回退到控制台
            eprintln!("无法创建日志文件 {}: {}", log_dir.display(), e);
            let _ = tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(env_filter)
                .try_init();
        }
    }
}

fn call_args(
    file: Option<String>,
    resolution: Option<String>,
    args: Option<String>,
) -> Result<serde_json::Value, String> {
    let mut value: serde_json::Value = match args {
        Some(raw) => serde_json::from_str(&raw).map_err(|e| format!("--args 不是合法的 JSON: {}", e))?,
        None => serde_json::json!({}),
    };
    if !value.is_object() {
        return Err("--args 必须是 JSON 对象".to_string());
    }
    if let Some(file) = file {
        value["fileName"] = file.into();
    }
    if let Some(resolution) = resolution {
        value["resolution"] = resolution.into();
    }
    Ok(value)
}

async fn run_call(state: &AppState, method: &str, args: serde_json::Value) -> ExitCode {
    match dispatch(state, method, args).await {
        Ok(value) => {
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            let failed = value.get("success").and_then(|s| s.as_bool()) == Some(false);
            if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            }
        }
        Err(e) => {
            println!("{}", serde_json::to_string_pretty(&e).unwrap_or_default());
            ExitCode::from(2)
        }
    }
}

async fn run_watch(state: &AppState) -> ExitCode {
    let _watcher = match state.engine.watch_remote() {
        Ok(Some(w)) => Some(w),
        Ok(None) => {
            tracing::info!("远程存储不支持目录监听，只输出本进程事件");
            None
        }
        Err(e) => {
            eprintln!("启动目录监听失败: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut events = Box::pin(state.engine.events());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.next() => match event {
                Some(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{}", line),
                    Err(e) => tracing::warn!("事件序列化失败: {}", e),
                },
                None => break,
            },
        }
    }
    ExitCode::SUCCESS
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config_dir = resolve_config_dir(cli.config_dir);
    init_logging(&config_dir);

    let state = match AppState::new(Some(config_dir)).await {
        Ok(state) => state,
        Err(e) => {
            tracing::error!("初始化失败: {:#}", e);
            eprintln!("初始化失败: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let code = match cli.command {
        Command::Call {
            method,
            file,
            resolution,
            args,
        } => match call_args(file, resolution, args) {
            Ok(args) => run_call(&state, &method, args).await,
            Err(e) => {
                eprintln!("{}", e);
                ExitCode::from(2)
            }
        },
        Command::Watch => run_watch(&state).await,
    };

    state.cleanup().await;
    code
}
