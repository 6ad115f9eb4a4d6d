//! Grounded answer generation with bounded retries and a model fallback chain.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use super::CompletionEngine;

/// Marker line prepended to a recent-records sample that does not answer the
/// question directly.
pub const SAMPLE_MARKER: &str = "[AMOSTRA RECENTE – sem correspondência direta à pergunta]";

/// Placeholder used when there is no context at all.
pub const NO_DATA: &str = "(sem dados)";

const EXTRACTIVE_LINES: usize = 3;

/// Retry and fallback settings for the generative model.
#[derive(Debug, Clone)]
pub struct GenerationPolicy {
    pub primary_model: String,
    pub fallback_models: Vec<String>,
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_jitter: Duration,
}

impl Default for GenerationPolicy {
    fn default() -> Self {
        Self {
            primary_model: "gemini-2.5-flash".into(),
            fallback_models: vec!["gemini-1.5-flash".into(), "gemini-1.5-pro".into()],
            max_attempts: 3,
            base_backoff: Duration::from_millis(500),
            max_jitter: Duration::from_millis(500),
        }
    }
}

impl GenerationPolicy {
    /// `base * 2^attempt + jitter`, with `attempt` counted from zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponential = self.base_backoff.saturating_mul(1u32 << attempt.min(16));
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..jitter_ms))
        };
        exponential + jitter
    }
}

/// Blocking pause between attempts.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

/// Sleeps the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Primary,
    SecondaryChain(usize),
    ExtractiveFallback,
}

pub struct ResponseGenerator {
    engine: Arc<dyn CompletionEngine>,
    policy: GenerationPolicy,
    sleeper: Arc<dyn Sleeper>,
}

impl ResponseGenerator {
    pub fn new(engine: Arc<dyn CompletionEngine>, policy: GenerationPolicy) -> Self {
        Self::with_sleeper(engine, policy, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(
        engine: Arc<dyn CompletionEngine>,
        policy: GenerationPolicy,
        sleeper: Arc<dyn Sleeper>,
    ) -> Self {
        Self {
            engine,
            policy,
            sleeper,
        }
    }

    pub fn policy(&self) -> &GenerationPolicy {
        &self.policy
    }

    /// Always returns a non-empty answer: model text when any model delivers,
    /// otherwise an extractive summary of `context_text`.
    pub fn generate(&self, question: &str, context_text: &str) -> String {
        let prompt = build_prompt(question, context_text);
        let mut state = GenerationState::Primary;

        loop {
            state = match state {
                GenerationState::Primary => {
                    if let Some(text) = self.attempt_model(&self.policy.primary_model, &prompt) {
                        return text;
                    }
                    GenerationState::SecondaryChain(0)
                }
                GenerationState::SecondaryChain(index) => {
                    match self.policy.fallback_models.get(index) {
                        Some(model) => {
                            if let Some(text) = self.attempt_model(model, &prompt) {
                                return text;
                            }
                            GenerationState::SecondaryChain(index + 1)
                        }
                        None => GenerationState::ExtractiveFallback,
                    }
                }
                GenerationState::ExtractiveFallback => {
                    warn!(
                        target: "finrag::generation",
                        "every model failed; answering with an extractive summary"
                    );
                    return extractive_answer(context_text);
                }
            };
        }
    }

    /// Runs the per-model retry policy. `None` means this model is exhausted.
    fn attempt_model(&self, model: &str, prompt: &str) -> Option<String> {
        for attempt in 0..self.policy.max_attempts {
            match self.engine.complete(model, prompt) {
                Ok(text) => {
                    let text = text.trim();
                    if text.is_empty() {
                        warn!(target: "finrag::generation", model, "model returned empty text");
                        return None;
                    }
                    info!(target: "finrag::generation", model, attempt, "model answered");
                    return Some(text.to_string());
                }
                Err(err) if err.is_transient() => {
                    if attempt + 1 >= self.policy.max_attempts {
                        warn!(
                            target: "finrag::generation",
                            model,
                            error = %err,
                            "model still unavailable after final attempt"
                        );
                        break;
                    }
                    let delay = self.policy.backoff(attempt);
                    debug!(
                        target: "finrag::generation",
                        model,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "transient model failure; backing off"
                    );
                    self.sleeper.sleep(delay);
                }
                Err(err) => {
                    warn!(
                        target: "finrag::generation",
                        model,
                        error = %err,
                        "non-retryable model failure; moving on"
                    );
                    return None;
                }
            }
        }
        None
    }
}

pub fn build_prompt(question: &str, context_text: &str) -> String {
    format!(
        "Você é um assistente de gestão financeira. Use EXCLUSIVAMENTE os DADOS a seguir (sem inventar nada). \
Responda em português do Brasil com tom casual, didático e amigável.\n\n\
Como responder:\n\
- Comece com um RESUMO curto (1–2 frases) dizendo o que foi encontrado.\n\
- Em seguida, traga DETALHES em tópicos simples: data, valor, emitente/destinatário e classificação.\n\
- Se a pergunta pedir 'maiores' ou 'top', foque nos registros de maior valor presentes nos DADOS.\n\
- Cite as fontes usando o identificador entre colchetes (ex.: [movements:123], [installments:45]).\n\
- Caso os dados sejam insuficientes, diga isso de forma objetiva e cordial.\n\n\
Regras para ausência de dados:\n\
- Se os DADOS vierem com o rótulo '{SAMPLE_MARKER}', informe claramente que não há dados para a pergunta do usuário. \
Depois, apresente a amostra apenas como referência, sem concluir que ela responde à pergunta.\n\
- Se os DADOS forem '{NO_DATA}', diga que não há registros para o recorte solicitado e sugira ampliar o período ou remover filtros.\n\n\
DADOS:\n{context_text}\n\n\
PERGUNTA: {question}\n\n\
Formato: RESUMO; depois DETALHES em tópicos. Evite jargões e respostas confusas."
    )
}

/// Last-resort answer built from the first non-empty context lines.
pub fn extractive_answer(context_text: &str) -> String {
    let lines: Vec<&str> = context_text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .take(EXTRACTIVE_LINES)
        .collect();

    let body = if lines.is_empty() {
        NO_DATA.to_string()
    } else {
        lines
            .iter()
            .map(|line| format!("- {line}"))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Ops, o modelo está indisponível agora. Para não te deixar sem resposta, segue um resumo rápido do que encontrei:\n{body}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::services::testing::{RecordingSleeper, ScriptedCompletion};

    fn generator(engine: Arc<ScriptedCompletion>, sleeper: Arc<RecordingSleeper>) -> ResponseGenerator {
        ResponseGenerator::with_sleeper(engine, GenerationPolicy::default(), sleeper)
    }

    #[test]
    fn transient_failures_are_retried_with_growing_backoff() {
        let engine = Arc::new(ScriptedCompletion::new([
            Err("HTTP 503 Service Unavailable"),
            Err("HTTP 503 Service Unavailable"),
            Ok("Resumo: tudo certo."),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let answer = generator(engine.clone(), sleeper.clone()).generate("q", "[movements:1] NF 1");

        assert_eq!(answer, "Resumo: tudo certo.");
        assert_eq!(engine.models(), vec!["gemini-2.5-flash"; 3]);

        let sleeps = sleeper.durations();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[0] >= Duration::from_millis(500) && sleeps[0] < Duration::from_millis(1000));
        assert!(sleeps[1] >= Duration::from_millis(1000) && sleeps[1] < Duration::from_millis(1500));
        assert!(sleeps[1] > sleeps[0]);
    }

    #[test]
    fn non_transient_error_skips_to_next_model_without_sleeping() {
        let engine = Arc::new(ScriptedCompletion::new([
            Err("HTTP 400 Bad Request: API key not valid"),
            Ok("resposta do fallback"),
        ]));
        let sleeper = Arc::new(RecordingSleeper::default());

        let answer = generator(engine.clone(), sleeper.clone()).generate("q", "ctx");

        assert_eq!(answer, "resposta do fallback");
        assert_eq!(engine.models(), vec!["gemini-2.5-flash", "gemini-1.5-flash"]);
        assert!(sleeper.durations().is_empty());
    }

    #[test]
    fn empty_completion_advances_the_chain() {
        let engine = Arc::new(ScriptedCompletion::new([Ok("   "), Ok(""), Ok("enfim")]));
        let answer =
            generator(engine.clone(), Arc::new(RecordingSleeper::default())).generate("q", "ctx");

        assert_eq!(answer, "enfim");
        assert_eq!(
            engine.models(),
            vec!["gemini-2.5-flash", "gemini-1.5-flash", "gemini-1.5-pro"]
        );
    }

    #[test]
    fn exhausted_chain_returns_extractive_summary() {
        let engine = Arc::new(ScriptedCompletion::always_err("503 overloaded"));
        let sleeper = Arc::new(RecordingSleeper::default());
        let context = "[movements:1] a\n\n[movements:2] b\n[movements:3] c\n[movements:4] d\n[movements:5] e";

        let answer = generator(engine.clone(), sleeper.clone()).generate("q", context);

        assert_eq!(engine.models().len(), 9, "three models, three attempts each");
        assert_eq!(sleeper.durations().len(), 6, "no sleep after a model's last attempt");
        assert_eq!(
            answer,
            "Ops, o modelo está indisponível agora. Para não te deixar sem resposta, segue um resumo rápido do que encontrei:\n\
             - [movements:1] a\n- [movements:2] b\n- [movements:3] c"
        );
    }

    #[test]
    fn extractive_summary_of_empty_context_says_no_data() {
        let answer = extractive_answer("  \n\n");
        assert!(answer.ends_with(NO_DATA));
        assert!(answer.starts_with("Ops,"));
    }

    #[test]
    fn prompt_embeds_context_and_question_verbatim() {
        let prompt = build_prompt("Quanto gastei?", "[movements:9] NF 9; Valor 10.00");
        assert!(prompt.contains("DADOS:\n[movements:9] NF 9; Valor 10.00\n\nPERGUNTA: Quanto gastei?"));
        assert!(prompt.contains(SAMPLE_MARKER));
    }

    #[test]
    fn zero_jitter_backoff_is_exact() {
        let policy = GenerationPolicy {
            max_jitter: Duration::ZERO,
            ..GenerationPolicy::default()
        };
        assert_eq!(policy.backoff(0), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(2000));
    }
}
