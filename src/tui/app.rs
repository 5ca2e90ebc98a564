//! Estado da aplicação TUI

use std::collections::VecDeque;
use std::time::Instant;

use crate::types::{Citation, InteractionStatus, ResearchResult};

/// Máximo de entradas de log mantidas
const MAX_LOGS: usize = 200;
/// Máximo de resumos de raciocínio mantidos
const MAX_THOUGHTS: usize = 50;
/// Linhas visíveis assumidas para o auto-scroll dos logs
const LOG_VIEWPORT: usize = 10;

/// Nível de severidade do log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Informação geral
    Info,
    /// Operação bem sucedida
    Success,
    /// Aviso
    Warning,
    /// Erro
    Error,
}

impl LogLevel {
    /// Símbolo exibido antes da mensagem
    pub fn symbol(&self) -> &'static str {
        match self {
            LogLevel::Info => "ℹ️ ",
            LogLevel::Success => "✅",
            LogLevel::Warning => "⚠️ ",
            LogLevel::Error => "❌",
        }
    }
}

/// Entrada de log
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Horário local (HH:MM:SS)
    pub timestamp: String,
    /// Nível
    pub level: LogLevel,
    /// Mensagem
    pub message: String,
}

impl LogEntry {
    /// Cria nova entrada com o horário atual
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            timestamp: chrono::Local::now().format("%H:%M:%S").to_string(),
            level,
            message: message.into(),
        }
    }

    /// Log de informação
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    /// Log de sucesso
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    /// Log de aviso
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    /// Log de erro
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }
}

/// Estado da tela
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppScreen {
    /// Digitação da pergunta
    Input,
    /// Pesquisa em andamento
    Research,
    /// Relatório final
    Result,
}

/// Tipo de pesquisa disparada pelo Enter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResearchMode {
    /// Agente de deep research em streaming
    #[default]
    Deep,
    /// Busca rápida com grounding
    Quick,
}

impl ResearchMode {
    /// Alterna entre os modos
    pub fn toggle(self) -> Self {
        match self {
            ResearchMode::Deep => ResearchMode::Quick,
            ResearchMode::Quick => ResearchMode::Deep,
        }
    }

    /// Rótulo exibido na tela de input
    pub fn label(&self) -> &'static str {
        match self {
            ResearchMode::Deep => "Deep Research",
            ResearchMode::Quick => "Busca Rápida",
        }
    }
}

/// Pedido da TUI ao worker em background
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TuiCommand {
    /// Nova pesquisa
    Research {
        /// Pergunta
        query: String,
        /// Modo escolhido
        mode: ResearchMode,
    },
    /// Follow-up sobre a interação exibida
    Followup {
        /// Interação concluída
        interaction_id: String,
        /// Pergunta
        question: String,
    },
}

/// Eventos enviados do worker para a TUI
#[derive(Debug, Clone)]
pub enum AppEvent {
    /// Novo log
    Log(LogEntry),
    /// O upstream atribuiu o id
    Started(String),
    /// Resumo de raciocínio
    Thought(String),
    /// Fragmento do relatório
    ContentDelta(String),
    /// Status observado
    Status(InteractionStatus),
    /// Pesquisa concluída
    Completed(ResearchResult),
    /// Stream caiu; a interação pode continuar no servidor
    Interrupted {
        /// Id, se já atribuído
        interaction_id: Option<String>,
        /// Detalhe
        message: String,
    },
    /// Erro fatal da pesquisa
    Error(String),
    /// Resposta de um follow-up
    FollowupAnswer {
        /// Pergunta feita
        question: String,
        /// Resposta
        result: ResearchResult,
    },
}

/// Par pergunta/resposta exibido na tela de resultado
#[derive(Debug, Clone)]
pub struct FollowupEntry {
    /// Pergunta
    pub question: String,
    /// Resposta, ausente enquanto o upstream trabalha
    pub answer: Option<String>,
}

/// Estado da aplicação
pub struct App {
    /// Tela atual
    pub screen: AppScreen,
    /// Modo da próxima pesquisa
    pub mode: ResearchMode,
    /// Texto sendo digitado
    pub input_text: String,
    /// Posição do cursor (em caracteres)
    pub cursor_pos: usize,
    /// Editando uma pergunta de follow-up na tela de resultado
    pub followup_editing: bool,
    /// Pergunta em pesquisa
    pub question: String,
    /// Id da interação corrente
    pub interaction_id: Option<String>,
    /// Último status conhecido
    pub status: Option<InteractionStatus>,
    /// Resumos de raciocínio recebidos
    pub thoughts: VecDeque<String>,
    /// Relatório (acumulado ou final)
    pub content: String,
    /// Citações do resultado final
    pub citations: Vec<Citation>,
    /// Follow-ups desta sessão
    pub followups: Vec<FollowupEntry>,
    /// Logs
    pub logs: VecDeque<LogEntry>,
    /// Scroll dos logs
    pub log_scroll: usize,
    /// Scroll do relatório
    pub result_scroll: usize,
    /// Pesquisa terminou (com ou sem sucesso)
    pub is_complete: bool,
    /// Erro final, se houver
    pub error: Option<String>,
    /// Stream interrompido com a interação ainda viva
    pub interrupted: bool,
    /// Perguntas anteriores (↑/↓ no input)
    pub history: Vec<String>,
    /// Índice no histórico durante a navegação
    pub history_index: Option<usize>,
    /// Início da pesquisa corrente
    pub start_time: Option<Instant>,
    /// Sair no próximo ciclo
    pub should_quit: bool,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    /// App na tela de input
    pub fn new() -> Self {
        Self {
            screen: AppScreen::Input,
            mode: ResearchMode::default(),
            input_text: String::new(),
            cursor_pos: 0,
            followup_editing: false,
            question: String::new(),
            interaction_id: None,
            status: None,
            thoughts: VecDeque::new(),
            content: String::new(),
            citations: Vec::new(),
            followups: Vec::new(),
            logs: VecDeque::new(),
            log_scroll: 0,
            result_scroll: 0,
            is_complete: false,
            error: None,
            interrupted: false,
            history: Vec::new(),
            history_index: None,
            start_time: None,
            should_quit: false,
        }
    }

    /// App com a pergunta já digitada
    pub fn with_question(question: impl Into<String>) -> Self {
        let mut app = Self::new();
        app.input_text = question.into();
        app.cursor_pos = app.char_count();
        app
    }

    /// Inicia a pesquisa com o texto atual.
    ///
    /// Devolve o comando para o worker, ou `None` se o input está vazio.
    pub fn start_research(&mut self) -> Option<TuiCommand> {
        let query = self.input_text.trim().to_string();
        if query.is_empty() {
            return None;
        }
        self.reset_research();
        self.history.push(query.clone());
        self.question = query.clone();
        self.clear_input();
        self.screen = AppScreen::Research;
        self.start_time = Some(Instant::now());
        self.push_log(LogEntry::info(format!(
            "Pesquisa iniciada ({})",
            self.mode.label()
        )));
        Some(TuiCommand::Research {
            query,
            mode: self.mode,
        })
    }

    /// Abre o campo de follow-up (tecla `f` na tela de resultado)
    pub fn begin_followup(&mut self) -> bool {
        if self.screen != AppScreen::Result || self.error.is_some() {
            return false;
        }
        if self.interaction_id.is_none() {
            self.push_log(LogEntry::warning("Follow-up só existe para deep research"));
            return false;
        }
        self.followup_editing = true;
        self.clear_input();
        true
    }

    /// Envia o follow-up digitado
    pub fn submit_followup(&mut self) -> Option<TuiCommand> {
        let question = self.input_text.trim().to_string();
        let interaction_id = self.interaction_id.clone()?;
        if question.is_empty() {
            return None;
        }
        self.followup_editing = false;
        self.clear_input();
        self.followups.push(FollowupEntry {
            question: question.clone(),
            answer: None,
        });
        Some(TuiCommand::Followup {
            interaction_id,
            question,
        })
    }

    /// Cancela a edição do follow-up
    pub fn cancel_followup(&mut self) {
        self.followup_editing = false;
        self.clear_input();
    }

    /// Processa um evento do worker
    pub fn handle_event(&mut self, event: AppEvent) {
        match event {
            AppEvent::Log(entry) => self.push_log(entry),
            AppEvent::Started(id) => {
                self.push_log(LogEntry::info(format!("Interação criada: {}", id)));
                self.interaction_id = Some(id);
                self.status = Some(InteractionStatus::Running);
            }
            AppEvent::Thought(text) => {
                self.thoughts.push_back(text);
                if self.thoughts.len() > MAX_THOUGHTS {
                    self.thoughts.pop_front();
                }
            }
            AppEvent::ContentDelta(text) => self.content.push_str(&text),
            AppEvent::Status(status) => self.status = Some(status),
            AppEvent::Completed(result) => {
                if let Some(id) = &result.interaction_id {
                    self.interaction_id = Some(id.clone());
                }
                self.status = Some(result.status);
                self.content = result.content;
                self.citations = result.citations;
                self.is_complete = true;
                self.result_scroll = 0;
                self.screen = AppScreen::Result;
                self.push_log(LogEntry::success(format!(
                    "Concluído em {:.1}s",
                    self.elapsed_secs()
                )));
            }
            AppEvent::Interrupted {
                interaction_id,
                message,
            } => {
                if interaction_id.is_some() {
                    self.interaction_id = interaction_id;
                }
                self.interrupted = true;
                self.is_complete = true;
                self.push_log(LogEntry::warning(format!("Stream interrompido: {}", message)));
                if let Some(hint) = self.resume_hint() {
                    self.push_log(LogEntry::info(hint));
                }
            }
            AppEvent::Error(message) => {
                self.status = Some(InteractionStatus::Failed);
                self.is_complete = true;
                self.push_log(LogEntry::error(message.clone()));
                self.error = Some(message);
            }
            AppEvent::FollowupAnswer { question, result } => {
                let answer = Some(result.content);
                match self
                    .followups
                    .iter_mut()
                    .rev()
                    .find(|f| f.question == question && f.answer.is_none())
                {
                    Some(entry) => entry.answer = answer,
                    None => self.followups.push(FollowupEntry { question, answer }),
                }
                self.push_log(LogEntry::success("Follow-up respondido"));
            }
        }
    }

    /// Dica para retomar uma interação cujo stream caiu
    pub fn resume_hint(&self) -> Option<String> {
        self.interaction_id.as_ref().map(|id| {
            format!(
                "A pesquisa continua no servidor. Retome com: gemini-research resume {} (ou status {})",
                id, id
            )
        })
    }

    fn push_log(&mut self, entry: LogEntry) {
        self.logs.push_back(entry);
        if self.logs.len() > MAX_LOGS {
            self.logs.pop_front();
        }
        // Auto-scroll para o final
        self.log_scroll = self.logs.len().saturating_sub(LOG_VIEWPORT);
    }

    /// Segundos desde o início da pesquisa
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    // ─────────────────────────────────────────────────
    // Scroll
    // ─────────────────────────────────────────────────

    /// Sobe uma linha (logs ou relatório, conforme a tela)
    pub fn scroll_up(&mut self) {
        match self.screen {
            AppScreen::Result => self.result_scroll = self.result_scroll.saturating_sub(1),
            _ => self.log_scroll = self.log_scroll.saturating_sub(1),
        }
    }

    /// Desce uma linha (logs ou relatório, conforme a tela)
    pub fn scroll_down(&mut self) {
        match self.screen {
            AppScreen::Result => {
                let max = self.content.lines().count().saturating_sub(1);
                if self.result_scroll < max {
                    self.result_scroll += 1;
                }
            }
            _ => {
                let max_scroll = self.logs.len().saturating_sub(LOG_VIEWPORT);
                if self.log_scroll < max_scroll {
                    self.log_scroll += 1;
                }
            }
        }
    }

    // ─────────────────────────────────────────────────
    // Input handling
    // ─────────────────────────────────────────────────

    /// Número de caracteres (não bytes)
    fn char_count(&self) -> usize {
        self.input_text.chars().count()
    }

    /// Insere caractere no cursor
    pub fn input_char(&mut self, c: char) {
        let mut chars: Vec<char> = self.input_text.chars().collect();
        let pos = self.cursor_pos.min(chars.len());
        chars.insert(pos, c);
        self.input_text = chars.into_iter().collect();
        self.cursor_pos = pos + 1;
        self.history_index = None;
    }

    /// Remove o caractere antes do cursor
    pub fn input_backspace(&mut self) {
        if self.cursor_pos == 0 {
            return;
        }
        let mut chars: Vec<char> = self.input_text.chars().collect();
        let pos = (self.cursor_pos - 1).min(chars.len().saturating_sub(1));
        if pos < chars.len() {
            chars.remove(pos);
            self.input_text = chars.into_iter().collect();
            self.cursor_pos = pos;
        }
    }

    /// Remove o caractere sob o cursor
    pub fn input_delete(&mut self) {
        if self.cursor_pos < self.char_count() {
            let mut chars: Vec<char> = self.input_text.chars().collect();
            chars.remove(self.cursor_pos);
            self.input_text = chars.into_iter().collect();
        }
    }

    /// Cursor para a esquerda
    pub fn cursor_left(&mut self) {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
    }

    /// Cursor para a direita
    pub fn cursor_right(&mut self) {
        if self.cursor_pos < self.char_count() {
            self.cursor_pos += 1;
        }
    }

    /// Cursor para o início
    pub fn cursor_home(&mut self) {
        self.cursor_pos = 0;
    }

    /// Cursor para o fim
    pub fn cursor_end(&mut self) {
        self.cursor_pos = self.char_count();
    }

    /// Pergunta anterior do histórico
    pub fn history_up(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let index = match self.history_index {
            None => self.history.len() - 1,
            Some(i) => i.saturating_sub(1),
        };
        self.history_index = Some(index);
        self.input_text = self.history[index].clone();
        self.cursor_pos = self.char_count();
    }

    /// Próxima pergunta do histórico
    pub fn history_down(&mut self) {
        if let Some(i) = self.history_index {
            if i + 1 < self.history.len() {
                self.history_index = Some(i + 1);
                self.input_text = self.history[i + 1].clone();
            } else {
                self.history_index = None;
                self.input_text.clear();
            }
            self.cursor_pos = self.char_count();
        }
    }

    /// Limpa o input
    pub fn clear_input(&mut self) {
        self.input_text.clear();
        self.cursor_pos = 0;
        self.history_index = None;
    }

    fn reset_research(&mut self) {
        self.question.clear();
        self.interaction_id = None;
        self.status = None;
        self.thoughts.clear();
        self.content.clear();
        self.citations.clear();
        self.followups.clear();
        self.logs.clear();
        self.log_scroll = 0;
        self.result_scroll = 0;
        self.is_complete = false;
        self.error = None;
        self.interrupted = false;
        self.followup_editing = false;
        self.start_time = None;
    }

    /// Volta para a tela de input mantendo o histórico
    pub fn reset(&mut self) {
        self.reset_research();
        self.clear_input();
        self.screen = AppScreen::Input;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            app.input_char(c);
        }
    }

    #[test]
    fn test_input_editing_is_char_based() {
        let mut app = App::new();
        type_text(&mut app, "pesquisação");
        app.cursor_left();
        app.input_backspace();
        assert_eq!(app.input_text, "pesquisaço");
        app.cursor_home();
        app.input_delete();
        assert_eq!(app.input_text, "esquisaço");
        app.cursor_end();
        assert_eq!(app.cursor_pos, 9);
    }

    #[test]
    fn test_start_research_requires_text() {
        let mut app = App::new();
        assert!(app.start_research().is_none());
        assert_eq!(app.screen, AppScreen::Input);

        app.mode = app.mode.toggle();
        type_text(&mut app, "  rust async runtimes ");
        let command = app.start_research().unwrap();
        assert_eq!(
            command,
            TuiCommand::Research {
                query: "rust async runtimes".into(),
                mode: ResearchMode::Quick,
            }
        );
        assert_eq!(app.screen, AppScreen::Research);
        assert!(app.input_text.is_empty());
        assert_eq!(app.history, vec!["rust async runtimes".to_string()]);
    }

    #[test]
    fn test_stream_events_build_the_report() {
        let mut app = App::with_question("q");
        app.start_research();
        app.handle_event(AppEvent::Started("int-1".into()));
        app.handle_event(AppEvent::Thought("planning".into()));
        app.handle_event(AppEvent::ContentDelta("Hel".into()));
        app.handle_event(AppEvent::ContentDelta("lo".into()));
        assert_eq!(app.content, "Hello");
        assert_eq!(app.thoughts.len(), 1);
        assert_eq!(app.status, Some(InteractionStatus::Running));

        let result = ResearchResult::new(
            "Hello, final",
            vec![Citation::new("https://example.com", None)],
        )
        .with_interaction_id("int-1");
        app.handle_event(AppEvent::Completed(result));
        assert_eq!(app.screen, AppScreen::Result);
        assert_eq!(app.content, "Hello, final");
        assert_eq!(app.citations.len(), 1);
        assert!(app.is_complete);
    }

    #[test]
    fn test_interruption_keeps_id_and_hints_resume() {
        let mut app = App::with_question("q");
        app.start_research();
        app.handle_event(AppEvent::Started("int-7".into()));
        app.handle_event(AppEvent::Interrupted {
            interaction_id: Some("int-7".into()),
            message: "connection reset".into(),
        });
        assert!(app.interrupted);
        assert_eq!(app.interaction_id.as_deref(), Some("int-7"));
        assert!(app.resume_hint().unwrap().contains("resume int-7"));
        assert!(app.logs.iter().any(|l| l.message.contains("resume int-7")));
    }

    #[test]
    fn test_followup_flow() {
        let mut app = App::with_question("q");
        app.start_research();
        // Fora da tela de resultado não abre
        assert!(!app.begin_followup());

        app.handle_event(AppEvent::Completed(
            ResearchResult::new("report", vec![]).with_interaction_id("int-1"),
        ));
        assert!(app.begin_followup());
        type_text(&mut app, "what are the risks?");
        let command = app.submit_followup().unwrap();
        assert_eq!(
            command,
            TuiCommand::Followup {
                interaction_id: "int-1".into(),
                question: "what are the risks?".into(),
            }
        );
        assert!(app.followups[0].answer.is_none());

        app.handle_event(AppEvent::FollowupAnswer {
            question: "what are the risks?".into(),
            result: ResearchResult::new("many", vec![]),
        });
        assert_eq!(app.followups.len(), 1);
        assert_eq!(app.followups[0].answer.as_deref(), Some("many"));
    }

    #[test]
    fn test_quick_result_has_no_followup() {
        let mut app = App::with_question("q");
        app.start_research();
        app.handle_event(AppEvent::Completed(ResearchResult::new("answer", vec![])));
        assert!(!app.begin_followup());
    }

    #[test]
    fn test_reset_keeps_history() {
        let mut app = App::with_question("first");
        app.start_research();
        app.handle_event(AppEvent::Error("boom".into()));
        assert_eq!(app.error.as_deref(), Some("boom"));
        app.reset();
        assert_eq!(app.screen, AppScreen::Input);
        assert!(app.error.is_none());
        app.history_up();
        assert_eq!(app.input_text, "first");
    }
}
