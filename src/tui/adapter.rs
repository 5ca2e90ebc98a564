//! Worker que executa pesquisas para a TUI e traduz o progresso em `AppEvent`s

use futures::StreamExt;
use std::sync::mpsc::Sender;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::app::{AppEvent, LogEntry, LogLevel, ResearchMode, TuiCommand};
use crate::client::ResearchBackend;
use crate::config::{QuickOptions, ResearchOptions};
use crate::error::ResearchError;
use crate::types::StreamEvent;

/// Ponte entre o núcleo de pesquisa e a thread da TUI.
///
/// A TUI roda de forma síncrona; cada comando vira uma task no runtime
/// tokio e o progresso volta pelo canal std.
#[derive(Clone)]
pub struct TuiAdapter {
    tx: Sender<AppEvent>,
    backend: Arc<dyn ResearchBackend>,
    runtime: Handle,
    research_options: ResearchOptions,
    quick_options: QuickOptions,
}

impl TuiAdapter {
    /// Cria o adaptador
    pub fn new(tx: Sender<AppEvent>, backend: Arc<dyn ResearchBackend>, runtime: Handle) -> Self {
        Self {
            tx,
            backend,
            runtime,
            research_options: ResearchOptions::default(),
            quick_options: QuickOptions::default(),
        }
    }

    /// Idioma aplicado às pesquisas disparadas pela TUI
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.research_options.language = language.clone();
        self.quick_options.language = language;
        self
    }

    /// Dispara o comando em background
    pub fn dispatch(&self, command: TuiCommand) -> JoinHandle<()> {
        let worker = self.clone();
        self.runtime.spawn(async move { worker.run(command).await })
    }

    /// Executa o comando até o fim
    pub async fn run(&self, command: TuiCommand) {
        match command {
            TuiCommand::Research {
                query,
                mode: ResearchMode::Deep,
            } => self.run_deep(&query).await,
            TuiCommand::Research {
                query,
                mode: ResearchMode::Quick,
            } => self.run_quick(&query).await,
            TuiCommand::Followup {
                interaction_id,
                question,
            } => self.run_followup(&interaction_id, &question).await,
        }
    }

    async fn run_deep(&self, query: &str) {
        self.log(LogLevel::Info, "🔬 Abrindo stream de deep research...");
        let mut stream = match self
            .backend
            .stream_research(query, &self.research_options)
            .await
        {
            Ok(stream) => stream,
            Err(e) => return self.fail(&e),
        };

        while let Some(item) = stream.next().await {
            match item {
                Ok(StreamEvent::Started { interaction_id }) => {
                    self.send(AppEvent::Started(interaction_id));
                }
                Ok(StreamEvent::Thought { text }) => self.send(AppEvent::Thought(text)),
                Ok(StreamEvent::ContentDelta { text }) => self.send(AppEvent::ContentDelta(text)),
                Ok(StreamEvent::Completed { result }) => {
                    self.log(
                        LogLevel::Success,
                        format!("📚 {} citações", result.citations.len()),
                    );
                    self.send(AppEvent::Completed(result));
                }
                Ok(StreamEvent::Failed { code, message, .. }) => {
                    let message = match code {
                        Some(code) => format!("{} ({})", message, code),
                        None => message,
                    };
                    self.send(AppEvent::Error(message));
                }
                Err(ResearchError::StreamInterrupted {
                    interaction_id,
                    message,
                    ..
                }) => {
                    self.report_interruption(interaction_id, message).await;
                }
                Err(e) => self.fail(&e),
            }
        }
    }

    /// Stream caiu: a interação segue viva no servidor, então mostra o
    /// status atual junto com a dica de retomada.
    async fn report_interruption(&self, interaction_id: Option<String>, message: String) {
        self.send(AppEvent::Interrupted {
            interaction_id: interaction_id.clone(),
            message,
        });
        let Some(id) = interaction_id else {
            return;
        };
        match self.backend.get_status(&id).await {
            Ok(status) => self.send(AppEvent::Status(status.status)),
            Err(e) => self.log(LogLevel::Warning, format!("Status indisponível: {}", e)),
        }
    }

    async fn run_quick(&self, query: &str) {
        self.log(LogLevel::Info, "⚡ Busca rápida com grounding...");
        match self.backend.quick_search(query, &self.quick_options).await {
            Ok(result) => {
                if let Some(model) = &result.model {
                    self.log(LogLevel::Info, format!("Modelo: {}", model));
                }
                self.send(AppEvent::Completed(result));
            }
            Err(e) => self.fail(&e),
        }
    }

    async fn run_followup(&self, interaction_id: &str, question: &str) {
        self.log(LogLevel::Info, format!("💬 Follow-up: {}", question));
        match self.backend.ask_followup(interaction_id, question).await {
            Ok(result) => self.send(AppEvent::FollowupAnswer {
                question: question.to_string(),
                result,
            }),
            // Falha de follow-up não invalida o relatório exibido
            Err(e) => self.log(LogLevel::Error, format!("Follow-up falhou: {}", e)),
        }
    }

    fn fail(&self, error: &ResearchError) {
        log::debug!("TUI worker error: {:?}", error);
        let message = match error.interaction_id() {
            Some(id) => format!("{} [id: {}]", error, id),
            None => error.to_string(),
        };
        self.send(AppEvent::Error(message));
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.send(AppEvent::Log(LogEntry::new(level, message)));
    }

    fn send(&self, event: AppEvent) {
        // A TUI pode já ter fechado
        let _ = self.tx.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ResearchClient;
    use crate::config::ClientConfig;
    use crate::poll::ManualClock;
    use crate::tui::create_event_channel;
    use crate::upstream::sse::InteractionEvent;
    use crate::upstream::{ApiFailure, InteractionScript, MockUpstream, StreamFrame};
    use serde_json::json;
    use std::sync::mpsc::Receiver;

    fn setup() -> (TuiAdapter, Receiver<AppEvent>, Arc<MockUpstream>) {
        let mock = Arc::new(MockUpstream::new());
        let client = ResearchClient::with_upstream(
            ClientConfig::new("key").unwrap(),
            mock.clone(),
            Arc::new(ManualClock::new()),
        );
        let (tx, rx) = create_event_channel();
        let adapter = TuiAdapter::new(tx, Arc::new(client), Handle::current());
        (adapter, rx, mock)
    }

    fn drain(rx: &Receiver<AppEvent>) -> Vec<AppEvent> {
        rx.try_iter().collect()
    }

    #[tokio::test]
    async fn test_deep_research_events() {
        let (adapter, rx, mock) = setup();
        mock.queue_stream(vec![
            Ok(StreamFrame::new(InteractionEvent::Started {
                interaction_id: "int-s".into(),
            })),
            Ok(StreamFrame::new(InteractionEvent::ThoughtDelta {
                text: "Planning".into(),
            })),
            Ok(StreamFrame::new(InteractionEvent::TextDelta { text: "Report".into() })),
            Ok(StreamFrame::new(InteractionEvent::Completed { interaction: None })),
        ]);

        adapter
            .run(TuiCommand::Research {
                query: "q".into(),
                mode: ResearchMode::Deep,
            })
            .await;

        let events = drain(&rx);
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Started(id) if id == "int-s")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AppEvent::Thought(t) if t == "Planning")));
        match events.last().unwrap() {
            AppEvent::Completed(result) => assert_eq!(result.content, "Report"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_interruption_reports_id() {
        let (adapter, rx, mock) = setup();
        mock.queue_stream(vec![
            Ok(StreamFrame::new(InteractionEvent::Started {
                interaction_id: "int-s".into(),
            })),
            Err(ApiFailure::Network("reset".into())),
        ]);

        adapter
            .run(TuiCommand::Research {
                query: "q".into(),
                mode: ResearchMode::Deep,
            })
            .await;

        let events = drain(&rx);
        assert!(events.iter().any(|e| matches!(
            e,
            AppEvent::Interrupted { interaction_id: Some(id), .. } if id == "int-s"
        )));
    }

    #[tokio::test]
    async fn test_quick_mode() {
        let (adapter, rx, mock) = setup();
        mock.queue_generate_json(json!({
            "candidates": [{"content": {"parts": [{"text": "Quick answer"}]}}]
        }));

        adapter
            .run(TuiCommand::Research {
                query: "q".into(),
                mode: ResearchMode::Quick,
            })
            .await;

        let events = drain(&rx);
        match events.last().unwrap() {
            AppEvent::Completed(result) => {
                assert_eq!(result.content, "Quick answer");
                assert!(result.interaction_id.is_none());
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_submission_error_becomes_error_event() {
        let (adapter, rx, mock) = setup();
        mock.fail_next_stream(ApiFailure::Timeout("120s".into()));

        adapter
            .run(TuiCommand::Research {
                query: "q".into(),
                mode: ResearchMode::Deep,
            })
            .await;

        assert!(drain(&rx).iter().any(|e| matches!(e, AppEvent::Error(_))));
    }

    #[tokio::test]
    async fn test_followup_answer() {
        let (adapter, rx, mock) = setup();
        mock.queue_interaction(InteractionScript::completes_after(0, "report", vec![]));
        mock.queue_interaction(InteractionScript::completed_on_create("answer", vec![]));
        let backend = adapter.backend.clone();
        let outcome = backend
            .research("q", &ResearchOptions::default(), Default::default())
            .await
            .unwrap();
        let id = outcome.interaction_id().to_string();

        adapter
            .run(TuiCommand::Followup {
                interaction_id: id,
                question: "why?".into(),
            })
            .await;

        let events = drain(&rx);
        match events.last().unwrap() {
            AppEvent::FollowupAnswer { question, result } => {
                assert_eq!(question, "why?");
                assert_eq!(result.content, "answer");
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
