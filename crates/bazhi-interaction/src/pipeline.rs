//! Translation/consultation pipeline.
//!
//! An interactive exchange is three strictly sequential remote calls:
//! translate the question into Chinese, consult the guru, translate the
//! reply back into English. Any failure aborts the whole exchange; the
//! pipeline holds no state, so an aborted exchange leaves nothing behind.
//!
//! Profile generation is a separate flow: a full native analysis, then a
//! structured element extraction at low temperature. The caller decides
//! how to overlap the background translation of the analysis; the
//! pipeline only provides the individual calls.

use std::sync::Arc;

use bazhi_core::completion::{ChatCompletion, CompletionRequest};
use bazhi_core::error::PipelineStage;
use bazhi_core::profile::BirthProfile;
use bazhi_core::session::{ChatTurn, MessageExchange};
use bazhi_core::{GuruError, Result};
use bazhi_infrastructure::AppConfig;

use crate::extract::{ElementalExtraction, parse_extraction};
use crate::prompts::{self, TranslationDirection};

/// Orchestrates the remote calls of one consultation exchange.
#[derive(Clone)]
pub struct ConsultPipeline {
    completion: Arc<dyn ChatCompletion>,
    config: AppConfig,
}

impl ConsultPipeline {
    pub fn new(completion: Arc<dyn ChatCompletion>, config: AppConfig) -> Self {
        Self { completion, config }
    }

    /// Runs one full question/answer exchange.
    ///
    /// `on_stage` fires immediately before each remote call so the surface
    /// can update its loading indicator.
    ///
    /// # Arguments
    /// * `question_en` - The user's question as typed
    /// * `profile` - Birth data for the guru system prompt
    /// * `history` - Prior native turns of this session, oldest first
    ///
    /// # Returns
    /// * `Ok(MessageExchange)` - All four texts, stamped with the current time
    /// * `Err(GuruError::Pipeline)` - The failed stage; no partial output escapes
    pub async fn run_exchange(
        &self,
        question_en: &str,
        profile: &BirthProfile,
        history: &[ChatTurn],
        mut on_stage: impl FnMut(PipelineStage),
    ) -> Result<MessageExchange> {
        let mut advance = |stage: PipelineStage| {
            tracing::info!(%stage, "pipeline stage");
            on_stage(stage);
        };

        advance(PipelineStage::TranslateQuestion);
        let question_zh = self
            .translate(question_en, TranslationDirection::EnToZh)
            .await
            .map_err(|err| stage_error(PipelineStage::TranslateQuestion, err))?;

        advance(PipelineStage::Consult);
        let reply_zh = self
            .consult(&question_zh, profile, history)
            .await
            .map_err(|err| stage_error(PipelineStage::Consult, err))?;

        advance(PipelineStage::TranslateReply);
        let reply_en = self
            .translate(&reply_zh, TranslationDirection::ZhToEn)
            .await
            .map_err(|err| stage_error(PipelineStage::TranslateReply, err))?;

        let exchange = MessageExchange::new(question_en, question_zh, reply_zh, reply_en);
        exchange.validate()?;
        Ok(exchange)
    }

    /// Translates a single text with the standard reply token budget.
    pub async fn translate(&self, text: &str, direction: TranslationDirection) -> Result<String> {
        self.translate_with_budget(text, direction, self.config.reply_max_tokens)
            .await
    }

    /// Translates the full analysis, which needs the larger budget.
    pub async fn translate_analysis(&self, analysis_zh: &str) -> Result<String> {
        self.translate_with_budget(
            analysis_zh,
            TranslationDirection::ZhToEn,
            self.config.analysis_max_tokens,
        )
        .await
    }

    async fn translate_with_budget(
        &self,
        text: &str,
        direction: TranslationDirection,
        max_tokens: u32,
    ) -> Result<String> {
        tracing::debug!(?direction, chars = text.len(), "translation call");

        let request = CompletionRequest::new(
            direction.system_prompt(),
            vec![ChatTurn::user(text)],
            self.config.translation_temperature,
            max_tokens,
        );
        self.completion.complete(request).await
    }

    /// Sends the translated question to the guru with the session history.
    pub async fn consult(
        &self,
        question_zh: &str,
        profile: &BirthProfile,
        history: &[ChatTurn],
    ) -> Result<String> {
        tracing::debug!(history_turns = history.len(), "consultation call");

        let system_prompt = prompts::guru_system_prompt(profile)?;
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history);
        messages.push(ChatTurn::user(question_zh));

        let request = CompletionRequest::new(
            system_prompt,
            messages,
            self.config.guru_temperature,
            self.config.reply_max_tokens,
        );
        self.completion.complete(request).await
    }

    /// Requests the comprehensive native-language analysis.
    ///
    /// # Returns
    /// * `Ok(String)` - The full analysis in Chinese
    /// * `Err(GuruError::Pipeline)` - Stage `Analysis` on any failure
    pub async fn analyze_profile(&self, profile: &BirthProfile) -> Result<String> {
        let system_prompt = prompts::guru_system_prompt(profile)?;
        let request = CompletionRequest::new(
            system_prompt,
            vec![ChatTurn::user(prompts::ANALYSIS_REQUEST_ZH)],
            self.config.guru_temperature,
            self.config.analysis_max_tokens,
        );

        self.completion
            .complete(request)
            .await
            .map_err(|err| stage_error(PipelineStage::Analysis, err))
    }

    /// Requests and parses the structured element extraction.
    ///
    /// # Returns
    /// * `Ok(ElementalExtraction)` - Counts summing to 8 plus the text fields
    /// * `Err(GuruError::Pipeline)` - Stage `Extraction` on a failed call
    /// * `Err(GuruError::Parse)` - If the model output cannot be parsed;
    ///   the flow aborts, nothing is persisted, no retry is attempted
    pub async fn extract_elements(&self, analysis_zh: &str) -> Result<ElementalExtraction> {
        let request = CompletionRequest::new(
            prompts::extraction_system_prompt(),
            vec![ChatTurn::user(analysis_zh)],
            self.config.extraction_temperature,
            self.config.reply_max_tokens,
        );

        let raw = self
            .completion
            .complete(request)
            .await
            .map_err(|err| stage_error(PipelineStage::Extraction, err))?;

        parse_extraction(&raw)
    }
}

// Already stage-tagged errors pass through unchanged.
fn stage_error(stage: PipelineStage, err: GuruError) -> GuruError {
    match err {
        GuruError::Pipeline { .. } => err,
        other => GuruError::pipeline(stage, other.to_string()),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    struct ScriptedCompletion {
        responses: Mutex<VecDeque<Result<String>>>,
        calls: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        fn new(responses: Vec<Result<String>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<CompletionRequest> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedCompletion {
        async fn complete(&self, request: CompletionRequest) -> Result<String> {
            self.calls.lock().unwrap().push(request);
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(GuruError::internal("script exhausted")))
        }
    }

    fn profile() -> BirthProfile {
        BirthProfile {
            year: 1988,
            month: 7,
            day: 20,
            hour: 14,
            gender: bazhi_core::profile::Gender::Male,
            birthplace: "上海".to_string(),
        }
    }

    fn pipeline(completion: Arc<ScriptedCompletion>) -> ConsultPipeline {
        ConsultPipeline::new(completion, AppConfig::default())
    }

    #[tokio::test]
    async fn exchange_runs_three_calls_in_order() {
        let completion = ScriptedCompletion::new(vec![
            Ok("我的年运如何？".to_string()),
            Ok("运势平稳。".to_string()),
            Ok("Your year is steady.".to_string()),
        ]);
        let pipeline = pipeline(completion.clone());

        let mut stages = Vec::new();
        let exchange = pipeline
            .run_exchange("How is my year?", &profile(), &[], |stage| {
                stages.push(stage)
            })
            .await
            .unwrap();

        assert_eq!(
            stages,
            vec![
                PipelineStage::TranslateQuestion,
                PipelineStage::Consult,
                PipelineStage::TranslateReply,
            ]
        );
        assert_eq!(exchange.user_text_en, "How is my year?");
        assert_eq!(exchange.user_text_zh, "我的年运如何？");
        assert_eq!(exchange.reply_text_zh, "运势平稳。");
        assert_eq!(exchange.reply_text_en, "Your year is steady.");

        let calls = completion.calls();
        assert_eq!(calls.len(), 3);
        // call A: translation prompt and temperature
        assert!(calls[0].system_prompt.contains("英中翻译专家"));
        assert_eq!(calls[0].temperature, 0.3);
        // call B: guru persona built from the birth profile
        assert!(calls[1].system_prompt.contains("出生地上海"));
        assert_eq!(calls[1].temperature, 0.7);
        // call C: back-translation sees the native reply
        assert_eq!(calls[2].messages[0].content, "运势平稳。");
    }

    #[tokio::test]
    async fn consultation_carries_session_history() {
        let completion = ScriptedCompletion::new(vec![
            Ok("新问题".to_string()),
            Ok("新回答".to_string()),
            Ok("New answer.".to_string()),
        ]);
        let pipeline = pipeline(completion.clone());

        let history = vec![ChatTurn::user("旧问题"), ChatTurn::assistant("旧回答")];
        pipeline
            .run_exchange("A new question", &profile(), &history, |_| {})
            .await
            .unwrap();

        let consult = &completion.calls()[1];
        assert_eq!(consult.messages.len(), 3);
        assert_eq!(consult.messages[0].content, "旧问题");
        assert_eq!(consult.messages[1].content, "旧回答");
        assert_eq!(consult.messages[2].content, "新问题");
    }

    #[tokio::test]
    async fn failed_translation_aborts_before_the_consultation() {
        let completion =
            ScriptedCompletion::new(vec![Err(GuruError::internal("connection refused"))]);
        let pipeline = pipeline(completion.clone());

        let mut stages = Vec::new();
        let err = pipeline
            .run_exchange("How is my year?", &profile(), &[], |stage| {
                stages.push(stage)
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuruError::Pipeline {
                stage: PipelineStage::TranslateQuestion,
                ..
            }
        ));
        assert_eq!(stages, vec![PipelineStage::TranslateQuestion]);
        assert_eq!(completion.calls().len(), 1);
    }

    #[tokio::test]
    async fn failed_consultation_is_tagged_with_its_stage() {
        let completion = ScriptedCompletion::new(vec![
            Ok("问题".to_string()),
            Err(GuruError::internal("relay upstream failure")),
        ]);
        let pipeline = pipeline(completion.clone());

        let err = pipeline
            .run_exchange("q", &profile(), &[], |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuruError::Pipeline {
                stage: PipelineStage::Consult,
                ..
            }
        ));
        assert_eq!(completion.calls().len(), 2);
    }

    #[tokio::test]
    async fn failed_reply_translation_discards_the_native_reply() {
        let completion = ScriptedCompletion::new(vec![
            Ok("问题".to_string()),
            Ok("回答".to_string()),
            Err(GuruError::internal("timeout")),
        ]);
        let pipeline = pipeline(completion.clone());

        let err = pipeline
            .run_exchange("q", &profile(), &[], |_| {})
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            GuruError::Pipeline {
                stage: PipelineStage::TranslateReply,
                ..
            }
        ));
        assert_eq!(completion.calls().len(), 3);
    }

    #[tokio::test]
    async fn analysis_uses_the_large_token_budget() {
        let completion = ScriptedCompletion::new(vec![Ok("详尽的八字分析。".to_string())]);
        let pipeline = pipeline(completion.clone());

        let analysis = pipeline.analyze_profile(&profile()).await.unwrap();
        assert_eq!(analysis, "详尽的八字分析。");

        let call = &completion.calls()[0];
        assert_eq!(call.max_tokens, AppConfig::default().analysis_max_tokens);
        assert_eq!(call.temperature, 0.7);
        assert!(call.system_prompt.contains("出生地上海"));
    }

    #[tokio::test]
    async fn extraction_parses_fenced_output_at_low_temperature() {
        let fenced = "```json\n{\"elements\":{\"Wood\":2,\"Fire\":1,\"Earth\":2,\"Metal\":1,\"Water\":2},\"description_zh\":\"木旺。\",\"description_en\":\"Wood strong.\",\"summary_zh\":\"木命。\",\"summary_en\":\"Wood chart.\"}\n```";
        let completion = ScriptedCompletion::new(vec![Ok(fenced.to_string())]);
        let pipeline = pipeline(completion.clone());

        let extraction = pipeline.extract_elements("详尽的八字分析。").await.unwrap();
        assert_eq!(extraction.elements.total(), 8);
        assert_eq!(extraction.description_en, "Wood strong.");

        let call = &completion.calls()[0];
        assert_eq!(call.temperature, 0.2);
        assert!(call.system_prompt.contains("Output ONLY valid JSON"));
        assert_eq!(call.messages[0].content, "详尽的八字分析。");
    }

    #[tokio::test]
    async fn unparseable_extraction_stays_a_parse_error() {
        let completion =
            ScriptedCompletion::new(vec![Ok("the chart is mostly wood".to_string())]);
        let pipeline = pipeline(completion.clone());

        let err = pipeline.extract_elements("分析").await.unwrap_err();
        assert!(err.is_parse());
    }

    #[tokio::test]
    async fn analysis_translation_uses_the_large_budget() {
        let completion = ScriptedCompletion::new(vec![Ok("The full analysis.".to_string())]);
        let pipeline = pipeline(completion.clone());

        pipeline.translate_analysis("详尽的八字分析。").await.unwrap();

        let call = &completion.calls()[0];
        assert_eq!(call.max_tokens, AppConfig::default().analysis_max_tokens);
        assert!(call.system_prompt.contains("Chinese-English translator"));
    }
}
