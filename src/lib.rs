//! # Gemini Research Tools
//!
//! Cliente Rust para pesquisa sobre a API Gemini, em dois estilos:
//!
//! - **Deep research**: tarefas longas executadas pelo agente de pesquisa do
//!   Gemini. Cada tarefa é uma *interação* com id próprio, que pode ser
//!   submetida, acompanhada por polling ou streaming, retomada depois de uma
//!   queda e continuada com perguntas de follow-up.
//! - **Operações rápidas**: uma única chamada `generateContent` com grounding
//!   de busca e/ou leitura de URLs, respondendo em segundos.
//!
//! ## Arquitetura
//!
//! ```text
//!  CLI │ TUI │ HTTP (axum) │ ferramentas de agente
//!                 │
//!          ResearchBackend  (client)
//!           ┌─────┴──────┐
//!  InteractionManager   QuickClient
//!   (interaction, poll)  (quick)
//!           └─────┬──────┘
//!             UpstreamApi  (upstream: HTTP real ou mock)
//! ```
//!
//! O núcleo nunca imprime nada: os front-ends decidem como apresentar
//! resultados, progresso e erros.
//!
//! ## Exemplo de Uso
//!
//! ```rust,ignore
//! use gemini_research::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = ResearchClient::from_config(load_client_config()?)?;
//!     let outcome = client
//!         .research("Tendências de computação quântica", &ResearchOptions::default(), WaitOptions::default())
//!         .await?;
//!     if let Some(result) = outcome.result() {
//!         println!("{}", result.content);
//!     }
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

/// Modelo de dados: resultados, citações, status, turnos e eventos de stream.
pub mod types;

/// Erros tipados do núcleo.
///
/// Todo erro que ocorre depois da atribuição do id carrega esse id, para o
/// chamador poder retomar a interação.
pub mod error;

/// Configuração do cliente (chave, endpoints, agente, polling, timeouts),
/// opções por chamada e carregamento a partir do ambiente.
pub mod config;

/// Máquina de polling com backoff exponencial, relógio injetável e
/// sinal de cancelamento.
pub mod poll;

/// Fronteira com a API Gemini: transporte HTTP, schemas de wire, parser SSE
/// e um upstream em memória para testes.
pub mod upstream;

/// Gerenciador do ciclo de vida das interações de deep research.
pub mod interaction;

/// Busca rápida, análise de URLs e a combinação das duas.
pub mod quick;

/// Traits de capacidade e o cliente completo.
pub mod client;

/// Ferramentas de agente (schemas JSON + dispatch).
pub mod tools;

/// Servidor HTTP com SSE.
#[cfg(feature = "server")]
pub mod server;

/// Interface de terminal rica (TUI).
///
/// Acompanha o raciocínio e o relatório em tempo real, mostra as citações
/// numeradas e permite perguntas de follow-up.
pub mod tui;

// Re-exports principais
pub use client::{LongRunningResearch, QuickResearch, ResearchBackend, ResearchClient};
pub use config::{
    install_panic_hook, load_client_config, ClientConfig, ModelVariant, PollConfig, QuickOptions,
    ResearchOptions,
};
pub use error::ResearchError;
pub use interaction::{InteractionManager, ResearchStream, WaitOptions};
pub use poll::{BackoffSchedule, CancellationSignal};
pub use quick::QuickClient;
pub use tools::ResearchToolbox;
pub use types::*;

/// Versão da biblioteca.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude com imports comuns para uso rápido.
///
/// ```rust,ignore
/// use gemini_research::prelude::*;
/// ```
pub mod prelude {
    pub use crate::client::{LongRunningResearch, QuickResearch, ResearchBackend, ResearchClient};
    pub use crate::config::{
        load_client_config, ClientConfig, ModelVariant, QuickOptions, ResearchOptions,
    };
    pub use crate::error::ResearchError;
    pub use crate::interaction::{ResearchStream, WaitOptions};
    pub use crate::poll::CancellationSignal;
    pub use crate::types::*;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
