//! Prompt construction for the translation and consultation calls.
//!
//! The system prompt texts are carried over verbatim from the deployed
//! client so the hosted relay sees identical traffic. The guru prompt is
//! the only parameterized one and goes through `minijinja`.

use bazhi_core::profile::BirthProfile;
use bazhi_core::{GuruError, Result};
use minijinja::{Environment, context};
use once_cell::sync::Lazy;

/// Direction of a translation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TranslationDirection {
    /// User question, English into Simplified Chinese.
    EnToZh,
    /// Guru reply, Chinese into English.
    ZhToEn,
}

impl TranslationDirection {
    /// Returns the system prompt for this direction.
    pub fn system_prompt(self) -> &'static str {
        match self {
            TranslationDirection::EnToZh => TRANSLATE_EN_TO_ZH,
            TranslationDirection::ZhToEn => TRANSLATE_ZH_TO_EN,
        }
    }
}

const TRANSLATE_EN_TO_ZH: &str = r#"你是一个专业的英中翻译专家，专门翻译八字命理相关内容。

任务：将用户的英文消息准确翻译成简体中文。

重要指南：
- 保持原意和语气
- 使用适当的中文八字术语
- 语言要自然流畅
- 如果涉及八字概念，使用正确的中文术语
- 只返回中文翻译，不要添加其他内容"#;

const TRANSLATE_ZH_TO_EN: &str = r#"You are a professional Chinese-English translator specializing in BaZhi (八字) and Chinese metaphysics.

Task: Translate the Chinese BaZhi expert's response into clear, accurate English.

Important guidelines:
- Maintain meaning and cultural nuances
- Translate key BaZhi terms appropriately (e.g., 八字 = BaZhi, 五行 = Five Elements)
- For important terms, show both: "BaZhi (八字)"
- Make the English natural and easy to understand
- Preserve the expert's tone and advice
- Return ONLY the English translation, nothing else
- Remove the verbose "The above content is generated by DeepSeek xxx xxx" from the final output"#;

// The stray quote and the 子平真栓 spelling are part of the deployed prompt.
const GURU_SYSTEM_TEMPLATE: &str = r#"你现在是一个中国传统八字命理的专业研究人员，你熟读穷通宝典、三命通会、滴天髓、渊海子平这些书籍。
你熟读千里命稿、协纪辨方书、果老星宗、子平真栓、神峰通考等一系列书籍。根据"排大运分阳年、阴年。
阳年：甲丙戊庚壬。阴年：乙丁己辛癸。阳年男，阴年女为顺排，阴年男，阳年女为逆排。
具体排法以月干支为基准，进行顺逆。小孩交大运前，以月柱干支为大运十天干：甲乙丙丁戊己庚辛壬癸，十二地支：子丑寅卯辰巳午未申酉戌亥。
我出生于{{ year }}年{{ month }}月{{ day }}日{{ hour }}时（阳历），{{ gender_zh }}，出生地{{ birthplace }}。
请你以一个专业四柱八字研究者的角色，对我的八字进行分析内容越全面越好"#;

/// User message for the full-analysis call.
pub const ANALYSIS_REQUEST_ZH: &str = "请对我的八字命盘进行一次完整的分析，内容越全面越好。";

const EXTRACTION_SYSTEM: &str = r#"You are a data extraction assistant for Chinese Four Pillars (BaZhi) readings.

Given a complete BaZhi analysis written in Chinese, produce:
1. The count of each of the five elements (五行) among the eight characters of the birth chart. The five counts MUST sum to exactly 8.
2. A short description of the elemental balance, in Chinese and in English.
3. A one-line summary of the chart, in Chinese and in English.

Respond with a JSON object of this exact shape:
{
  "elements": {"wood": 0, "fire": 0, "earth": 0, "metal": 0, "water": 0},
  "description_zh": "...",
  "description_en": "...",
  "summary_zh": "...",
  "summary_en": "..."
}

IMPORTANT: Output ONLY valid JSON, no markdown formatting or code blocks."#;

static TEMPLATE_ENV: Lazy<Environment<'static>> = Lazy::new(Environment::new);

/// Renders the guru system prompt for a birth profile.
///
/// # Returns
/// * `Ok(String)` - The consultation persona prompt with the birth data filled in
/// * `Err(GuruError::Internal)` - If template rendering fails
pub fn guru_system_prompt(profile: &BirthProfile) -> Result<String> {
    TEMPLATE_ENV
        .render_str(
            GURU_SYSTEM_TEMPLATE,
            context! {
                year => profile.year,
                month => profile.month,
                day => profile.day,
                hour => profile.hour,
                gender_zh => profile.gender.label_zh(),
                birthplace => profile.birthplace,
            },
        )
        .map_err(|err| GuruError::internal(format!("failed to render guru prompt: {err}")))
}

/// Returns the system prompt for the structured element extraction call.
pub fn extraction_system_prompt() -> &'static str {
    EXTRACTION_SYSTEM
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use bazhi_core::profile::Gender;

    fn profile() -> BirthProfile {
        BirthProfile {
            year: 1990,
            month: 3,
            day: 15,
            hour: 8,
            gender: Gender::Female,
            birthplace: "北京".to_string(),
        }
    }

    #[test]
    fn guru_prompt_interpolates_birth_data() {
        let prompt = guru_system_prompt(&profile()).unwrap();

        assert!(prompt.contains("我出生于1990年3月15日8时（阳历）"));
        assert!(prompt.contains("女性"));
        assert!(prompt.contains("出生地北京"));
        assert!(prompt.contains("四柱八字研究者"));
    }

    #[test]
    fn guru_prompt_uses_male_label_for_male_profiles() {
        let mut profile = profile();
        profile.gender = Gender::Male;

        let prompt = guru_system_prompt(&profile).unwrap();
        assert!(prompt.contains("男性"));
        assert!(!prompt.contains("女性"));
    }

    #[test]
    fn translation_prompts_pin_output_to_the_target_language() {
        let en_to_zh = TranslationDirection::EnToZh.system_prompt();
        assert!(en_to_zh.contains("只返回中文翻译"));

        let zh_to_en = TranslationDirection::ZhToEn.system_prompt();
        assert!(zh_to_en.contains("Return ONLY the English translation"));
        assert!(zh_to_en.contains("generated by DeepSeek"));
    }

    #[test]
    fn extraction_prompt_demands_bare_json() {
        let prompt = extraction_system_prompt();

        assert!(prompt.contains("Output ONLY valid JSON"));
        assert!(prompt.contains(r#""elements""#));
        assert!(prompt.contains("sum to exactly 8"));
        for key in ["description_zh", "description_en", "summary_zh", "summary_en"] {
            assert!(prompt.contains(key), "missing key {key}");
        }
    }
}
