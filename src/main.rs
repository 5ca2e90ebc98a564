// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// GEMINI RESEARCH CLI
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Uso:
//   gemini-research research "Tendências de computação quântica"
//   gemini-research research --stream "pergunta"
//   gemini-research status <ID> | result <ID> | followup <ID> "pergunta"
//   gemini-research quick-search "pergunta" -m gemini-3-pro-preview
//   gemini-research analyze-urls "resuma" -u https://example.com
//   gemini-research tui
//   gemini-research serve --port 3000   (feature `server`)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use clap::{Parser, Subcommand};
use futures::StreamExt;
use gemini_research::config::{install_panic_hook, load_client_config_from};
use gemini_research::prelude::*;
use gemini_research::tools::ResearchToolbox;
use gemini_research::tui::{
    create_event_channel, install_terminal_panic_hook, run_tui, App, TuiAdapter,
};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "gemini-research")]
#[command(version, about = "Deep research, grounded search and URL analysis with Gemini", long_about = None)]
struct Cli {
    /// Chave da API (sobrescreve GEMINI_API_KEY)
    #[arg(long, global = true)]
    api_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deep research: submete e espera (ou acompanha em streaming)
    Research {
        /// Pergunta
        query: String,

        /// Mostra raciocínio e relatório em tempo real
        #[arg(long)]
        stream: bool,

        /// Só submete e imprime o id
        #[arg(long, conflicts_with = "stream")]
        no_wait: bool,

        /// Instruções de formato do relatório
        #[arg(short, long)]
        format: Option<String>,

        /// Idioma da resposta (ja, en, pt-BR, ...)
        #[arg(short, long)]
        language: Option<String>,

        /// Teto local de espera em segundos
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Salva o relatório em markdown
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Status de uma interação
    Status {
        /// Id da interação
        id: String,
    },

    /// Resultado de uma interação concluída
    Result {
        /// Id da interação
        id: String,

        /// Salva o relatório em markdown
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Pergunta de follow-up sobre uma interação concluída
    Followup {
        /// Id da interação
        id: String,

        /// Pergunta
        question: String,
    },

    /// Reabre o stream de uma interação em andamento
    Resume {
        /// Id da interação
        id: String,
    },

    /// Busca rápida com grounding
    QuickSearch {
        /// Pergunta
        query: String,

        #[command(flatten)]
        quick: QuickArgs,
    },

    /// Analisa o conteúdo de URLs
    AnalyzeUrls {
        /// Pergunta sobre as URLs
        query: String,

        /// URL a analisar (repetível, até 20)
        #[arg(short = 'u', long = "url", required = true)]
        urls: Vec<String>,

        #[command(flatten)]
        quick: QuickArgs,
    },

    /// Busca + análise de URLs
    SearchAnalyze {
        /// Pergunta
        query: String,

        /// URL de referência (repetível)
        #[arg(short = 'u', long = "url")]
        urls: Vec<String>,

        #[command(flatten)]
        quick: QuickArgs,
    },

    /// Ferramentas de agente
    Tools {
        #[command(subcommand)]
        action: ToolsAction,
    },

    /// Interface de terminal interativa
    Tui {
        /// Pergunta inicial (opcional)
        query: Vec<String>,

        /// Idioma da resposta
        #[arg(short, long)]
        language: Option<String>,
    },

    /// Servidor HTTP com SSE
    #[cfg(feature = "server")]
    Serve {
        /// Endereço de escuta
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        /// Porta
        #[arg(long, default_value_t = 3000)]
        port: u16,

        /// Token Bearer exigido nas rotas protegidas
        #[arg(long, env = "RESEARCH_SERVER_SECRET")]
        secret: Option<String>,
    },

    /// Versão
    Version,
}

#[derive(clap::Args)]
struct QuickArgs {
    /// Modelo (gemini-3-flash-preview, gemini-3-pro-preview)
    #[arg(short, long)]
    model: Option<ModelVariant>,

    /// Idioma da resposta
    #[arg(short, long)]
    language: Option<String>,

    /// Salva a resposta em markdown
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl QuickArgs {
    fn options(&self) -> QuickOptions {
        QuickOptions {
            model: self.model,
            language: self.language.clone(),
        }
    }
}

#[derive(Subcommand)]
enum ToolsAction {
    /// Lista as specs (JSON schema)
    List,
    /// Invoca uma ferramenta com argumentos JSON
    Call {
        /// Nome da ferramenta
        name: String,
        /// Objeto de argumentos
        #[arg(default_value = "{}")]
        args: String,
    },
}

/// Tenta carregar o arquivo .env de múltiplos locais possíveis
fn load_dotenv() {
    let possible_paths = [
        PathBuf::from(".env"),
        PathBuf::from("../.env"),
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(".env"),
    ];

    for path in &possible_paths {
        if path.exists() {
            match dotenvy::from_path(path) {
                Ok(_) => {
                    eprintln!(
                        "✓ Carregado .env de: {:?}",
                        path.canonicalize().unwrap_or(path.clone())
                    );
                    return;
                }
                Err(e) => {
                    eprintln!("⚠ Erro ao carregar {:?}: {}", path, e);
                }
            }
        }
    }

    // Última tentativa: dotenvy padrão (sobe diretórios)
    let _ = dotenvy::dotenv();
}

#[tokio::main]
async fn main() -> ExitCode {
    load_dotenv();
    let cli = Cli::parse();

    // A TUI ocupa a tela: só avisos e erros chegam ao stderr
    let default_filter = match cli.command {
        Commands::Tui { .. } => "warn",
        _ => "info",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
    install_panic_hook();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("✗ Erro: {:#}", e);
            if let Some(id) = e
                .downcast_ref::<ResearchError>()
                .and_then(|re| re.interaction_id())
            {
                eprintln!();
                print_resume_hint(id);
            }
            ExitCode::FAILURE
        }
    }
}

/// Cliente a partir do ambiente; `--api-key` tem precedência.
fn build_client(api_key: Option<String>) -> anyhow::Result<ResearchClient> {
    let config = load_client_config_from(|key| match (key, &api_key) {
        ("GEMINI_API_KEY", Some(k)) => Some(k.clone()),
        _ => std::env::var(key).ok(),
    })?;
    Ok(ResearchClient::from_config(config)?)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Commands::Version = cli.command {
        println!("gemini-research v{}", gemini_research::VERSION);
        return Ok(());
    }

    let client = build_client(cli.api_key)?;

    match cli.command {
        Commands::Research {
            query,
            stream,
            no_wait,
            format,
            language,
            timeout,
            output,
        } => {
            let options = ResearchOptions {
                format_instructions: format,
                language,
            };
            if no_wait {
                let id = client.start_research(&query, &options).await?;
                println!("{}", id);
                print_resume_hint(&id);
                return Ok(());
            }
            if stream {
                let stream = client.stream_research(&query, &options).await?;
                return consume_stream(stream, output.as_deref()).await;
            }
            run_research(&client, &query, &options, timeout, output.as_deref()).await
        }

        Commands::Status { id } => {
            let status = client.get_status(&id).await?;
            println!("🆔 {}", status.interaction_id);
            println!("📊 {}", status.status.as_str());
            if let Some(error) = status.error {
                println!("❌ {}", error);
            }
            Ok(())
        }

        Commands::Result { id, output } => {
            let result = client.get_result(&id).await?;
            print_result(&result, output.as_deref())
        }

        Commands::Followup { id, question } => {
            let result = client.ask_followup(&id, &question).await?;
            if let Some(followup_id) = &result.interaction_id {
                eprintln!("🆔 follow-up: {}", followup_id);
            }
            print_result(&result, None)
        }

        Commands::Resume { id } => {
            let stream = client.resume_stream(&id).await?;
            consume_stream(stream, None).await
        }

        Commands::QuickSearch { query, quick } => {
            let result = client.quick_search(&query, &quick.options()).await?;
            print_result(&result, quick.output.as_deref())
        }

        Commands::AnalyzeUrls { query, urls, quick } => {
            let result = client.analyze_urls(&urls, &query, &quick.options()).await?;
            print_result(&result, quick.output.as_deref())
        }

        Commands::SearchAnalyze { query, urls, quick } => {
            let result = client
                .search_and_analyze(&query, &urls, &quick.options())
                .await?;
            print_result(&result, quick.output.as_deref())
        }

        Commands::Tools { action } => {
            let toolbox = ResearchToolbox::new(Arc::new(client));
            match action {
                ToolsAction::List => {
                    println!("{}", serde_json::to_string_pretty(&toolbox.specs())?);
                    Ok(())
                }
                ToolsAction::Call { name, args } => {
                    let args: serde_json::Value = serde_json::from_str(&args)?;
                    let value = toolbox.invoke(&name, args).await;
                    println!("{}", serde_json::to_string_pretty(&value)?);
                    match value.get("error") {
                        Some(error) => anyhow::bail!("tool '{}' failed: {}", name, error),
                        None => Ok(()),
                    }
                }
            }
        }

        Commands::Tui { query, language } => run_tui_mode(client, query.join(" "), language).await,

        #[cfg(feature = "server")]
        Commands::Serve { host, port, secret } => {
            use gemini_research::server::{start_server, AppState};

            let addr: std::net::SocketAddr = format!("{}:{}", host, port).parse()?;
            let agent = client.config().agent.clone();
            if secret.is_some() {
                log::info!("🔒 Autenticação Bearer ativada");
            }
            let state = Arc::new(AppState::new(Arc::new(client), agent, secret));
            start_server(addr, state).await
        }

        Commands::Version => Ok(()),
    }
}

// ─────────────────────────────────────────────────
// Deep research
// ─────────────────────────────────────────────────

/// Submete e espera; Ctrl-C só interrompe a espera local.
async fn run_research(
    client: &ResearchClient,
    query: &str,
    options: &ResearchOptions,
    timeout: Option<u64>,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    let cancel = CancellationSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let wait = WaitOptions {
        timeout: timeout.map(Duration::from_secs),
        cancel,
    };
    eprintln!("🔬 Pesquisando (pode levar vários minutos)...");
    let outcome = client.research(query, options, wait).await?;

    match outcome {
        ResearchOutcome::Completed { result, .. } => print_result(&result, output),
        ResearchOutcome::Failed {
            interaction_id,
            status,
            error,
        } => anyhow::bail!(
            "research {} ended as {}: {}",
            interaction_id,
            status.as_str(),
            error.unwrap_or_else(|| "no detail".into())
        ),
        ResearchOutcome::TimedOut {
            interaction_id,
            last_status,
            elapsed_secs,
        } => {
            eprintln!(
                "⏱️  Tempo local esgotado após {}s (status: {}). A pesquisa continua no servidor.",
                elapsed_secs,
                last_status.as_str()
            );
            println!("{}", interaction_id);
            print_resume_hint(&interaction_id);
            Ok(())
        }
        ResearchOutcome::Cancelled {
            interaction_id,
            last_status,
        } => {
            eprintln!(
                "\n⏹️  Espera cancelada (status: {}). A pesquisa continua no servidor.",
                last_status.as_str()
            );
            println!("{}", interaction_id);
            print_resume_hint(&interaction_id);
            Ok(())
        }
    }
}

/// Imprime o stream: raciocínio no stderr, relatório no stdout.
async fn consume_stream(mut stream: ResearchStream, output: Option<&Path>) -> anyhow::Result<()> {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut stdout = std::io::stdout();

    loop {
        let item = tokio::select! {
            item = stream.next() => item,
            _ = &mut ctrl_c => {
                eprintln!("\n⏹️  Stream encerrado localmente.");
                if let Some(id) = stream.interaction_id() {
                    print_resume_hint(&id);
                }
                return Ok(());
            }
        };
        let Some(item) = item else {
            return Ok(());
        };

        match item {
            Ok(StreamEvent::Started { interaction_id }) => {
                eprintln!("🆔 {}", interaction_id);
            }
            Ok(StreamEvent::Thought { text }) => eprintln!("💭 {}", text.trim()),
            Ok(StreamEvent::ContentDelta { text }) => {
                print!("{}", text);
                stdout.flush()?;
            }
            Ok(StreamEvent::Completed { result }) => {
                println!();
                print_citations(&result);
                if let Some(path) = output {
                    save_markdown(&result, path)?;
                }
                return Ok(());
            }
            Ok(StreamEvent::Failed {
                interaction_id,
                code,
                message,
            }) => {
                anyhow::bail!(
                    "research {} failed{}: {}",
                    interaction_id.as_deref().unwrap_or("(no id)"),
                    code.map(|c| format!(" ({})", c)).unwrap_or_default(),
                    message
                );
            }
            Err(e) => {
                // Queda de stream: o id volta no erro para o polling
                eprintln!("\n⚠️  {}", e);
                return Err(e.into());
            }
        }
    }
}

// ─────────────────────────────────────────────────
// TUI
// ─────────────────────────────────────────────────

async fn run_tui_mode(
    client: ResearchClient,
    query: String,
    language: Option<String>,
) -> anyhow::Result<()> {
    let (tx, rx) = create_event_channel();
    let adapter = TuiAdapter::new(tx, Arc::new(client), tokio::runtime::Handle::current())
        .with_language(language);

    // Com pergunta na linha de comando a pesquisa começa direto
    let mut app = App::with_question(query);
    if let Some(command) = app.start_research() {
        adapter.dispatch(command);
    }

    install_terminal_panic_hook();
    let worker = adapter.clone();
    let app = tokio::task::spawn_blocking(move || {
        run_tui(app, rx, move |command| {
            worker.dispatch(command);
        })
    })
    .await??;

    // Saiu com a pesquisa viva: o id não pode se perder
    if !app.is_complete || app.interrupted {
        if let Some(id) = &app.interaction_id {
            println!("⚠️  TUI encerrada com a pesquisa em andamento: {}", id);
            print_resume_hint(id);
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────
// Saída
// ─────────────────────────────────────────────────

fn print_resume_hint(id: &str) {
    eprintln!("   Status:    gemini-research status {}", id);
    eprintln!("   Resultado: gemini-research result {}", id);
    eprintln!("   Stream:    gemini-research resume {}", id);
}

fn print_citations(result: &ResearchResult) {
    if result.citations.is_empty() {
        return;
    }
    println!("\n📚 Fontes ({}):", result.citations.len());
    for (i, citation) in result.citations.iter().enumerate() {
        println!("  [{}] {}", i + 1, citation);
    }
}

fn print_result(result: &ResearchResult, output: Option<&Path>) -> anyhow::Result<()> {
    println!("{}", result.content);
    print_citations(result);
    for meta in result.url_metadata.iter().filter(|m| !m.is_success()) {
        eprintln!("⚠️  {} não foi lida ({})", meta.url, meta.status);
    }
    if let Some(model) = &result.model {
        eprintln!("🤖 {}", model);
    }
    if let Some(path) = output {
        save_markdown(result, path)?;
    }
    Ok(())
}

fn save_markdown(result: &ResearchResult, path: &Path) -> anyhow::Result<()> {
    let mut markdown = result.content.clone();
    if !result.citations.is_empty() {
        markdown.push_str("\n\n## Sources\n\n");
        for (i, citation) in result.citations.iter().enumerate() {
            let title = citation.title.as_deref().unwrap_or(&citation.url);
            markdown.push_str(&format!("{}. [{}]({})\n", i + 1, title, citation.url));
        }
    }
    std::fs::write(path, markdown)?;
    eprintln!("💾 Salvo em {}", path.display());
    Ok(())
}
