//! Renderização da interface TUI

use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span, Text},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use super::app::{App, AppScreen, LogLevel, ResearchMode};
use crate::types::InteractionStatus;

/// Renderiza a interface completa
pub fn render(frame: &mut Frame<'_>, app: &App) {
    match app.screen {
        AppScreen::Input => render_input_screen(frame, app),
        AppScreen::Research => render_research_screen(frame, app),
        AppScreen::Result => render_result_screen(frame, app),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TELA DE INPUT
// ═══════════════════════════════════════════════════════════════════════════════

fn render_input_screen(frame: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(5), // Logo
            Constraint::Length(3), // Modo
            Constraint::Length(3), // Input
            Constraint::Min(3),    // Histórico
            Constraint::Length(1), // Ajuda
        ])
        .margin(2)
        .split(frame.area());

    let logo = format!(
        "╔══════════════════════════════════════════════╗\n\
         ║   🔬 GEMINI RESEARCH v{:<8} Deep + Quick   ║\n\
         ╚══════════════════════════════════════════════╝",
        crate::VERSION
    );
    let header = Paragraph::new(logo)
        .style(Style::default().fg(Color::Cyan))
        .alignment(Alignment::Center);
    frame.render_widget(header, chunks[0]);

    let mode_line = Line::from(
        [ResearchMode::Deep, ResearchMode::Quick]
            .iter()
            .flat_map(|mode| {
                let style = if *mode == app.mode {
                    Style::default()
                        .fg(Color::Black)
                        .bg(Color::Yellow)
                        .add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::DarkGray)
                };
                [Span::styled(format!(" {} ", mode.label()), style), Span::raw("  ")]
            })
            .collect::<Vec<_>>(),
    );
    let mode = Paragraph::new(mode_line)
        .alignment(Alignment::Center)
        .block(Block::default().title(" Modo (Tab) ").borders(Borders::ALL));
    frame.render_widget(mode, chunks[1]);

    let input = input_line(
        app,
        " Ex: Quais as tendências de computação quântica em 2025?",
    );
    let input = Paragraph::new(input).block(
        Block::default()
            .title(" Digite sua pergunta ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Yellow)),
    );
    frame.render_widget(input, chunks[2]);

    let history_items: Vec<ListItem<'_>> = app
        .history
        .iter()
        .enumerate()
        .rev()
        .take(8)
        .map(|(i, q)| {
            let selected = app.history_index == Some(i);
            let style = if selected {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(Color::Gray)
            };
            ListItem::new(Line::from(vec![
                Span::styled(if selected { " ▶ " } else { "   " }, style),
                Span::styled(truncate(q, 70), style),
            ]))
        })
        .collect();
    let history = List::new(history_items).block(
        Block::default()
            .title(" 📜 Histórico (↑/↓) ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::DarkGray)),
    );
    frame.render_widget(history, chunks[3]);

    frame.render_widget(
        help_line(&[
            ("Enter", Color::Green, "Pesquisar"),
            ("Tab", Color::Yellow, "Modo"),
            ("↑↓", Color::Yellow, "Histórico"),
            ("Esc", Color::Red, "Sair"),
        ]),
        chunks[4],
    );
}

/// Linha de input com cursor (índices de caracteres, não bytes)
fn input_line<'a>(app: &App, placeholder: &'a str) -> Line<'a> {
    let cursor = Span::styled(
        "│",
        Style::default()
            .fg(Color::Yellow)
            .add_modifier(Modifier::RAPID_BLINK),
    );
    if app.input_text.is_empty() {
        return Line::from(vec![
            cursor,
            Span::styled(placeholder, Style::default().fg(Color::DarkGray)),
        ]);
    }
    let chars: Vec<char> = app.input_text.chars().collect();
    let pos = app.cursor_pos.min(chars.len());
    Line::from(vec![
        Span::raw(chars[..pos].iter().collect::<String>()),
        cursor,
        Span::raw(chars[pos..].iter().collect::<String>()),
    ])
}

// ═══════════════════════════════════════════════════════════════════════════════
// TELA DE PESQUISA
// ═══════════════════════════════════════════════════════════════════════════════

fn render_research_screen(frame: &mut Frame<'_>, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(4),      // Header
            Constraint::Percentage(35), // Raciocínio
            Constraint::Min(6),         // Conteúdo
            Constraint::Length(8),      // Logs
            Constraint::Length(1),      // Ajuda
        ])
        .split(frame.area());

    render_header(frame, app, chunks[0]);
    render_thoughts(frame, app, chunks[1]);

    let content = if app.content.is_empty() {
        Text::styled("Aguardando conteúdo...", Style::default().fg(Color::DarkGray))
    } else {
        Text::raw(app.content.as_str())
    };
    // Mantém o final do relatório visível enquanto chega
    let visible = chunks[2].height.saturating_sub(2) as usize;
    let scroll = app.content.lines().count().saturating_sub(visible);
    let report = Paragraph::new(content)
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0))
        .block(
            Block::default()
                .title(format!(" 📝 Relatório ({} chars) ", app.content.chars().count()))
                .borders(Borders::ALL),
        );
    frame.render_widget(report, chunks[2]);

    render_logs(frame, app, chunks[3]);

    let help = if app.interrupted {
        help_line(&[("q", Color::Red, "Sair (a pesquisa continua no servidor)")])
    } else if app.is_complete {
        help_line(&[("Esc", Color::Yellow, "Nova pesquisa"), ("q", Color::Red, "Sair")])
    } else {
        help_line(&[("↑↓", Color::Yellow, "Logs"), ("q", Color::Red, "Sair")])
    };
    frame.render_widget(help, chunks[4]);
}

fn render_header(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let (icon, label) = if app.error.is_some() {
        ("❌", "Falhou")
    } else if app.interrupted {
        ("⚠️", "Stream interrompido")
    } else if app.is_complete {
        ("✅", "Concluído")
    } else {
        ("🔍", "Pesquisando...")
    };

    let id = app.interaction_id.as_deref().unwrap_or("(aguardando id)");
    let status = app.status.map(|s| s.as_str()).unwrap_or("pending");
    let status_color = match app.status {
        Some(InteractionStatus::Completed) => Color::Green,
        Some(InteractionStatus::Failed) | Some(InteractionStatus::Cancelled) => Color::Red,
        _ => Color::Yellow,
    };

    let text = Text::from(vec![
        Line::from(vec![
            Span::styled(
                format!(" {} {} ", icon, label),
                Style::default().add_modifier(Modifier::BOLD),
            ),
            Span::raw("│ 🆔 "),
            Span::styled(id.to_string(), Style::default().fg(Color::Cyan)),
            Span::raw(" │ "),
            Span::styled(status, Style::default().fg(status_color)),
            Span::raw(format!(" │ ⏱️  {:.0}s", app.elapsed_secs())),
        ]),
        Line::from(Span::styled(
            format!(" ❓ {}", truncate(&app.question, area.width.saturating_sub(6) as usize)),
            Style::default().fg(Color::White),
        )),
    ]);
    let header = Paragraph::new(text).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );
    frame.render_widget(header, area);
}

fn render_thoughts(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let items: Vec<ListItem<'_>> = app
        .thoughts
        .iter()
        .skip(app.thoughts.len().saturating_sub(visible))
        .map(|t| {
            ListItem::new(Line::from(vec![
                Span::styled("💭 ", Style::default().fg(Color::Magenta)),
                Span::styled(
                    truncate(t.lines().next().unwrap_or(""), area.width.saturating_sub(8) as usize),
                    Style::default().fg(Color::Gray),
                ),
            ]))
        })
        .collect();
    let list = List::new(items).block(
        Block::default()
            .title(format!(" 🤔 Raciocínio ({}) ", app.thoughts.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Magenta)),
    );
    frame.render_widget(list, area);
}

fn render_logs(frame: &mut Frame<'_>, app: &App, area: Rect) {
    let visible = area.height.saturating_sub(2) as usize;
    let max_width = (area.width as usize).saturating_sub(18);
    let items: Vec<ListItem<'_>> = app
        .logs
        .iter()
        .skip(app.log_scroll)
        .take(visible)
        .map(|entry| {
            let style = match entry.level {
                LogLevel::Info => Style::default().fg(Color::White),
                LogLevel::Success => Style::default().fg(Color::Green),
                LogLevel::Warning => Style::default().fg(Color::Yellow),
                LogLevel::Error => Style::default().fg(Color::Red),
            };
            ListItem::new(Line::from(vec![
                Span::styled(
                    format!("[{}] ", entry.timestamp),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::styled(format!("{} ", entry.level.symbol()), style),
                Span::styled(truncate(&entry.message, max_width), style),
            ]))
        })
        .collect();

    let logs = List::new(items).block(
        Block::default()
            .title(" 📋 Logs ")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(logs, area);
}

// ═══════════════════════════════════════════════════════════════════════════════
// TELA DE RESULTADO
// ═══════════════════════════════════════════════════════════════════════════════

fn render_result_screen(frame: &mut Frame<'_>, app: &App) {
    let followup_height = if app.followups.is_empty() && !app.followup_editing {
        0
    } else {
        8
    };
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),               // Header
            Constraint::Min(5),                  // Relatório
            Constraint::Length(7),               // Citações
            Constraint::Length(followup_height), // Follow-ups
            Constraint::Length(if app.followup_editing { 3 } else { 0 }),
            Constraint::Length(1), // Ajuda
        ])
        .margin(1)
        .split(frame.area());

    let mut header_spans = vec![Span::styled(
        " ✅ PESQUISA CONCLUÍDA ",
        Style::default().fg(Color::Green).add_modifier(Modifier::BOLD),
    )];
    if let Some(id) = &app.interaction_id {
        header_spans.push(Span::raw(" │ 🆔 "));
        header_spans.push(Span::styled(id.clone(), Style::default().fg(Color::Cyan)));
    }
    header_spans.push(Span::raw(format!(" │ ⏱️  {:.1}s", app.elapsed_secs())));
    let header = Paragraph::new(Line::from(header_spans))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Green)),
        );
    frame.render_widget(header, chunks[0]);

    // Relatório com scroll
    let total_lines = app.content.lines().count();
    let visible = chunks[1].height.saturating_sub(2) as usize;
    let max_scroll = total_lines.saturating_sub(visible);
    let scroll = app.result_scroll.min(max_scroll);
    let scroll_info = if total_lines > visible {
        format!(" [{}/{}]", scroll + 1, max_scroll + 1)
    } else {
        String::new()
    };
    let report = Paragraph::new(app.content.as_str())
        .wrap(Wrap { trim: false })
        .scroll((scroll as u16, 0))
        .block(
            Block::default()
                .title(format!(" 📝 Relatório{} ", scroll_info))
                .borders(Borders::ALL),
        );
    frame.render_widget(report, chunks[1]);

    // Citações numeradas
    let width = (chunks[2].width as usize).saturating_sub(8);
    let citation_items: Vec<ListItem<'_>> = app
        .citations
        .iter()
        .enumerate()
        .map(|(i, c)| {
            ListItem::new(Line::from(vec![
                Span::styled(format!(" [{}] ", i + 1), Style::default().fg(Color::Yellow)),
                Span::styled(
                    truncate(&c.to_string(), width),
                    Style::default()
                        .fg(Color::Blue)
                        .add_modifier(Modifier::UNDERLINED),
                ),
            ]))
        })
        .collect();
    let citations = List::new(citation_items).block(
        Block::default()
            .title(format!(" 📚 Citações ({}) ", app.citations.len()))
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Blue)),
    );
    frame.render_widget(citations, chunks[2]);

    if followup_height > 0 {
        let mut lines = Vec::new();
        for entry in &app.followups {
            lines.push(Line::from(vec![
                Span::styled("Q: ", Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)),
                Span::raw(entry.question.clone()),
            ]));
            match &entry.answer {
                Some(answer) => lines.push(Line::from(vec![
                    Span::styled("A: ", Style::default().fg(Color::Green).add_modifier(Modifier::BOLD)),
                    Span::raw(answer.clone()),
                ])),
                None => lines.push(Line::from(Span::styled(
                    "A: ⏳ aguardando...",
                    Style::default().fg(Color::DarkGray),
                ))),
            }
        }
        let followups = Paragraph::new(Text::from(lines))
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .title(" 💬 Follow-ups ")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(Color::Magenta)),
            );
        frame.render_widget(followups, chunks[3]);
    }

    if app.followup_editing {
        let input = Paragraph::new(input_line(app, " Pergunta sobre o relatório...")).block(
            Block::default()
                .title(" Follow-up (Enter envia, Esc cancela) ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        );
        frame.render_widget(input, chunks[4]);
    }

    frame.render_widget(
        help_line(&[
            ("↑↓", Color::Yellow, "Scroll"),
            ("f", Color::Magenta, "Follow-up"),
            ("Esc", Color::Green, "Nova"),
            ("q", Color::Red, "Sair"),
        ]),
        chunks[5],
    );
}

/// Barra de ajuda com atalhos
fn help_line(keys: &[(&'static str, Color, &'static str)]) -> Paragraph<'static> {
    let spans: Vec<Span<'static>> = keys
        .iter()
        .flat_map(|(key, color, label)| {
            [
                Span::styled(*key, Style::default().fg(*color).add_modifier(Modifier::BOLD)),
                Span::raw(format!(" {}  ", label)),
            ]
        })
        .collect();
    Paragraph::new(Line::from(spans))
        .alignment(Alignment::Center)
        .style(Style::default().fg(Color::DarkGray))
}

/// Trunca em caracteres, com reticências
fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else if max_len > 3 {
        let head: String = s.chars().take(max_len - 3).collect();
        format!("{}...", head)
    } else {
        s.chars().take(max_len).collect()
    }
}
