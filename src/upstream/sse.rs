// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// PARSER SSE DA INTERACTIONS API
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
// Parser incremental: recebe bytes na ordem em que chegam do socket e
// devolve frames completos. O buffer é de bytes, então caracteres UTF-8
// partidos entre chunks não são corrompidos.
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

use serde_json::Value;

use super::wire::InteractionResource;

/// Evento bruto do stream, já tipado.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionEvent {
    /// `interaction.start`
    Started {
        /// Id atribuído
        interaction_id: String,
    },
    /// `content.delta` de texto
    TextDelta {
        /// Fragmento
        text: String,
    },
    /// `content.delta` de resumo de raciocínio
    ThoughtDelta {
        /// Fragmento
        text: String,
    },
    /// `interaction.status_update`
    StatusUpdate {
        /// Status textual
        status: String,
    },
    /// `interaction.complete`
    Completed {
        /// Interação final (pode vir sem outputs)
        interaction: Option<InteractionResource>,
    },
    /// `error`
    Error {
        /// Código
        code: Option<String>,
        /// Mensagem
        message: String,
    },
}

/// Frame completo: evento + `event_id` para reconexão.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamFrame {
    /// Id do evento, quando enviado
    pub event_id: Option<String>,
    /// Evento
    pub event: InteractionEvent,
}

impl StreamFrame {
    /// Frame sem event_id.
    pub fn new(event: InteractionEvent) -> Self {
        Self {
            event_id: None,
            event,
        }
    }
}

/// Parser incremental de SSE.
#[derive(Debug, Default)]
pub struct SseStreamParser {
    buffer: Vec<u8>,
    // bytes do buffer já varridos sem achar fronteira
    scanned: usize,
}

impl SseStreamParser {
    /// Alimenta bytes e drena os frames completos.
    ///
    /// A busca por fronteiras recomeça de onde a chamada anterior parou, e
    /// os frames consumidos saem do buffer de uma vez só.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<StreamFrame> {
        self.buffer.extend(bytes.iter().copied().filter(|b| *b != b'\r'));
        let mut frames = Vec::new();

        let mut start = 0;
        // Um `\n` no fim do trecho já varrido pode fechar par com o novo
        let mut cursor = self.scanned.saturating_sub(1);
        while let Some(offset) = find_boundary(&self.buffer[cursor..]) {
            let end = cursor + offset;
            let frame = String::from_utf8_lossy(&self.buffer[start..end]);
            if let Some(parsed) = parse_frame(&frame) {
                frames.push(parsed);
            }
            start = end + 2;
            cursor = start;
        }

        self.buffer.drain(..start);
        self.scanned = self.buffer.len();
        frames
    }

    /// Drena um frame final sem linha em branco (fim do corpo).
    pub fn finish(&mut self) -> Vec<StreamFrame> {
        self.scanned = 0;
        if self.is_empty_buffer() {
            self.buffer.clear();
            return Vec::new();
        }
        let raw = std::mem::take(&mut self.buffer);
        let frame = String::from_utf8_lossy(&raw);
        parse_frame(&frame).into_iter().collect()
    }

    /// Parse de um payload SSE completo de uma vez.
    pub fn parse_frames(input: &str) -> Vec<StreamFrame> {
        let mut parser = Self::default();
        let mut frames = parser.feed(input.as_bytes());
        frames.extend(parser.finish());
        frames
    }

    /// Buffer sem conteúdo pendente?
    pub fn is_empty_buffer(&self) -> bool {
        self.buffer.iter().all(|b| b.is_ascii_whitespace())
    }
}

fn find_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}

fn parse_frame(frame: &str) -> Option<StreamFrame> {
    let mut data_lines = Vec::new();
    let mut sse_id = None;

    for line in frame.lines() {
        if let Some(value) = line.strip_prefix("data:") {
            let value = value.strip_prefix(' ').unwrap_or(value);
            data_lines.push(value);
        } else if let Some(value) = line.strip_prefix("id:") {
            sse_id = Some(value.trim().to_string());
        }
    }

    let payload = data_lines.join("\n");
    let payload = payload.trim();
    if payload.is_empty() || payload == "[DONE]" {
        return None;
    }

    let value: Value = match serde_json::from_str(payload) {
        Ok(v) => v,
        Err(e) => {
            log::warn!("⚠️ Frame SSE ignorado (JSON inválido): {}", e);
            return None;
        }
    };

    let event_id = value
        .get("event_id")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or(sse_id)
        .filter(|id| !id.is_empty());

    map_event(&value).map(|event| StreamFrame { event_id, event })
}

fn str_at<'a>(value: &'a Value, path: &[&str]) -> Option<&'a str> {
    path.iter()
        .try_fold(value, |v, key| v.get(key))
        .and_then(Value::as_str)
}

fn map_event(value: &Value) -> Option<InteractionEvent> {
    let event_type = value
        .get("event_type")
        .or_else(|| value.get("type"))
        .and_then(Value::as_str)?;

    match event_type {
        "interaction.start" => {
            let id = str_at(value, &["interaction", "id"])
                .or_else(|| str_at(value, &["interaction_id"]))?;
            Some(InteractionEvent::Started {
                interaction_id: id.to_string(),
            })
        }
        "content.delta" => {
            let delta = value.get("delta")?;
            match delta.get("type").and_then(Value::as_str) {
                Some("thought_summary") | Some("thought") => {
                    let text = str_at(delta, &["content", "text"])
                        .or_else(|| str_at(delta, &["text"]))
                        .unwrap_or("");
                    Some(InteractionEvent::ThoughtDelta { text: text.into() })
                }
                Some("text") | None => {
                    let text = str_at(delta, &["text"]).unwrap_or("");
                    Some(InteractionEvent::TextDelta { text: text.into() })
                }
                Some(_) => None,
            }
        }
        "interaction.status_update" => {
            let status = str_at(value, &["status"])
                .or_else(|| str_at(value, &["interaction", "status"]))?;
            Some(InteractionEvent::StatusUpdate {
                status: status.to_string(),
            })
        }
        "interaction.complete" => {
            let interaction = value
                .get("interaction")
                .and_then(|i| serde_json::from_value::<InteractionResource>(i.clone()).ok());
            Some(InteractionEvent::Completed { interaction })
        }
        "error" => {
            let error = value.get("error").unwrap_or(value);
            let code = error.get("code").and_then(|c| match c {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
            let message = str_at(error, &["message"])
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Some(InteractionEvent::Error { code, message })
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frames_incrementally() {
        let mut parser = SseStreamParser::default();
        let mut frames = Vec::new();

        frames.extend(parser.feed(
            b"data: {\"event_type\":\"interaction.start\",\"interaction\":{\"id\":\"int-1\"},\"event_id\":\"e1\"}\n\n",
        ));
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_id.as_deref(), Some("e1"));

        frames.extend(parser.feed(b"data: {\"event_type\":\"content.delta\",\"delta\":{\"type\":\"te"));
        assert_eq!(frames.len(), 1);
        frames.extend(parser.feed(b"xt\",\"text\":\"Hello\"}}\n\ndata: [DONE]\n\n"));
        assert_eq!(frames.len(), 2);
        assert_eq!(
            frames[1].event,
            InteractionEvent::TextDelta {
                text: "Hello".into()
            }
        );
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn test_byte_by_byte_matches_whole_input() {
        let mut input = String::new();
        for i in 0..50 {
            input.push_str(&format!(
                "id: e{}\r\ndata: {{\"event_type\":\"content.delta\",\"delta\":{{\"type\":\"text\",\"text\":\"part {}\"}}}}\r\n\r\n",
                i, i
            ));
        }
        let whole = SseStreamParser::parse_frames(&input);
        assert_eq!(whole.len(), 50);

        let mut parser = SseStreamParser::default();
        let mut frames = Vec::new();
        for byte in input.as_bytes() {
            frames.extend(parser.feed(std::slice::from_ref(byte)));
            // Só o frame ainda incompleto fica no buffer
            assert!(parser.buffer.len() < 128);
        }
        frames.extend(parser.finish());
        assert_eq!(frames, whole);
        assert_eq!(frames[49].event_id.as_deref(), Some("e49"));
    }

    #[test]
    fn test_boundary_split_between_chunks() {
        let mut parser = SseStreamParser::default();
        let first = parser.feed(b"data: {\"event_type\":\"content.delta\",\"delta\":{\"text\":\"a\"}}\n");
        assert!(first.is_empty());
        let second = parser.feed(b"\ndata: {\"event_type\":\"content.delta\",\"delta\":{\"text\":\"b\"}}\n\n");
        assert_eq!(second.len(), 2);
        assert!(parser.is_empty_buffer());
    }

    #[test]
    fn test_utf8_split_across_chunks() {
        let payload = "data: {\"event_type\":\"content.delta\",\"delta\":{\"type\":\"text\",\"text\":\"日本語\"}}\n\n";
        let bytes = payload.as_bytes();
        let cut = payload.find('本').unwrap() + 1;

        let mut parser = SseStreamParser::default();
        let mut frames = parser.feed(&bytes[..cut]);
        frames.extend(parser.feed(&bytes[cut..]));
        assert_eq!(
            frames,
            vec![StreamFrame::new(InteractionEvent::TextDelta {
                text: "日本語".into()
            })]
        );
    }

    #[test]
    fn test_crlf_and_thought_summary() {
        let input = "id: 7\r\ndata: {\"event_type\":\"content.delta\",\"delta\":{\"type\":\"thought_summary\",\"content\":{\"text\":\"Planning\"}}}\r\n\r\n";
        let frames = SseStreamParser::parse_frames(input);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].event_id.as_deref(), Some("7"));
        assert_eq!(
            frames[0].event,
            InteractionEvent::ThoughtDelta {
                text: "Planning".into()
            }
        );
    }

    #[test]
    fn test_complete_and_error_events() {
        let input = concat!(
            "data: {\"event_type\":\"interaction.complete\",\"interaction\":{\"id\":\"int-1\",\"status\":\"completed\",\"outputs\":[{\"type\":\"text\",\"text\":\"done\"}]}}\n\n",
            "data: {\"event_type\":\"error\",\"error\":{\"code\":\"RESOURCE_EXHAUSTED\",\"message\":\"quota\"}}\n\n",
            "data: {\"event_type\":\"something.new\"}\n\n",
            "data: {\"event_type\":\"interaction.complete\"}"
        );
        let frames = SseStreamParser::parse_frames(input);
        assert_eq!(frames.len(), 3);
        match &frames[0].event {
            InteractionEvent::Completed { interaction: Some(i) } => {
                assert_eq!(i.text().as_deref(), Some("done"))
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            frames[1].event,
            InteractionEvent::Error {
                code: Some("RESOURCE_EXHAUSTED".into()),
                message: "quota".into()
            }
        );
        assert_eq!(frames[2].event, InteractionEvent::Completed { interaction: None });
    }
}
