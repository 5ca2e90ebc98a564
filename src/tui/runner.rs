//! Loop da TUI: desenha, drena eventos do worker e trata o teclado

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};

use super::app::{App, AppEvent, AppScreen, TuiCommand};
use super::ui;

/// Executa a TUI até o usuário sair.
///
/// `dispatch` recebe os comandos gerados pelo teclado (nova pesquisa,
/// follow-up) e deve executá-los fora desta thread.
pub fn run_tui<F>(mut app: App, event_rx: Receiver<AppEvent>, dispatch: F) -> io::Result<App>
where
    F: FnMut(TuiCommand),
{
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run_app(&mut terminal, &mut app, event_rx, dispatch);

    // Restaurar terminal mesmo se o loop falhou
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    result?;
    Ok(app)
}

fn run_app<F>(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    event_rx: Receiver<AppEvent>,
    mut dispatch: F,
) -> io::Result<()>
where
    F: FnMut(TuiCommand),
{
    loop {
        terminal.draw(|frame| ui::render(frame, app))?;

        // Eventos do worker (não bloqueante)
        while let Ok(event) = event_rx.try_recv() {
            app.handle_event(event);
        }

        if event::poll(Duration::from_millis(100))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(command) = handle_key(app, key.code) {
                        dispatch(command);
                    }
                }
            }
        }

        if app.should_quit {
            return Ok(());
        }
    }
}

/// Aplica uma tecla ao estado; devolve o comando a despachar, se houver.
pub fn handle_key(app: &mut App, code: KeyCode) -> Option<TuiCommand> {
    match app.screen {
        AppScreen::Input => match code {
            KeyCode::Esc => app.should_quit = true,
            KeyCode::Enter => return app.start_research(),
            KeyCode::Tab => app.mode = app.mode.toggle(),
            KeyCode::Up => app.history_up(),
            KeyCode::Down => app.history_down(),
            code => edit_input(app, code),
        },
        AppScreen::Result if app.followup_editing => match code {
            KeyCode::Enter => return app.submit_followup(),
            KeyCode::Esc => app.cancel_followup(),
            code => edit_input(app, code),
        },
        AppScreen::Research | AppScreen::Result => match code {
            KeyCode::Char('q') => app.should_quit = true,
            KeyCode::Up | KeyCode::Char('k') => app.scroll_up(),
            KeyCode::Down | KeyCode::Char('j') => app.scroll_down(),
            KeyCode::Char('f') => {
                app.begin_followup();
            }
            // Na tela de pesquisa só volta depois do desfecho
            KeyCode::Esc if app.screen == AppScreen::Result || app.is_complete => app.reset(),
            _ => {}
        },
    }
    None
}

fn edit_input(app: &mut App, code: KeyCode) {
    match code {
        KeyCode::Char(c) => app.input_char(c),
        KeyCode::Backspace => app.input_backspace(),
        KeyCode::Delete => app.input_delete(),
        KeyCode::Left => app.cursor_left(),
        KeyCode::Right => app.cursor_right(),
        KeyCode::Home => app.cursor_home(),
        KeyCode::End => app.cursor_end(),
        _ => {}
    }
}

/// Restaura o terminal antes de o hook anterior registrar o panic.
pub fn install_terminal_panic_hook() {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen, DisableMouseCapture);
        previous(info);
    }));
}

/// Canal do worker para a TUI
pub fn create_event_channel() -> (Sender<AppEvent>, Receiver<AppEvent>) {
    mpsc::channel()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tui::app::ResearchMode;
    use crate::types::ResearchResult;

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            handle_key(app, KeyCode::Char(c));
        }
    }

    #[test]
    fn test_q_is_text_on_input_screen() {
        let mut app = App::new();
        type_text(&mut app, "quantum");
        assert!(!app.should_quit);
        assert_eq!(app.input_text, "quantum");
    }

    #[test]
    fn test_enter_dispatches_research() {
        let mut app = App::new();
        handle_key(&mut app, KeyCode::Tab);
        type_text(&mut app, "ev market");
        let command = handle_key(&mut app, KeyCode::Enter);
        assert_eq!(
            command,
            Some(TuiCommand::Research {
                query: "ev market".into(),
                mode: ResearchMode::Quick,
            })
        );
        assert_eq!(app.screen, AppScreen::Research);

        // Esc não abandona uma pesquisa em andamento
        handle_key(&mut app, KeyCode::Esc);
        assert_eq!(app.screen, AppScreen::Research);
        handle_key(&mut app, KeyCode::Char('q'));
        assert!(app.should_quit);
    }

    #[test]
    fn test_result_screen_followup_keys() {
        let mut app = App::with_question("q");
        app.start_research();
        app.handle_event(AppEvent::Completed(
            ResearchResult::new("line 1\nline 2\nline 3", vec![]).with_interaction_id("int-1"),
        ));

        handle_key(&mut app, KeyCode::Down);
        assert_eq!(app.result_scroll, 1);

        handle_key(&mut app, KeyCode::Char('f'));
        assert!(app.followup_editing);
        // Durante a edição, q é texto
        type_text(&mut app, "q?");
        assert!(!app.should_quit);
        let command = handle_key(&mut app, KeyCode::Enter);
        assert!(matches!(command, Some(TuiCommand::Followup { .. })));

        handle_key(&mut app, KeyCode::Esc);
        assert_eq!(app.screen, AppScreen::Input);
    }
}
