//! 生成与分析的提示词
//!
//! 按制品类型把参数写进 user 消息；系统提示要求模型只输出一个 Move 模块，
//! 模块地址使用 `simulation` 命名地址，与沙箱中的 Move.toml 对应。

use crate::llm::Message;
use crate::sandbox::CompileOutcome;
use crate::simulation::{ArtifactParameters, ArtifactType};

const GENERATION_SYSTEM: &str = "You are an expert Move developer for the Aptos blockchain. \
Write a single, complete, compilable Move module under the named address `simulation` \
(e.g. `module simulation::token { ... }`). Depend only on the Aptos framework and the Move stdlib. \
Return only the Move source inside one ```move code block, with no additional explanation.";

const ANALYSIS_SYSTEM: &str = "You are a Move smart-contract auditor. Given a generated module and \
the compiler output, explain in a few short paragraphs whether it is ready for deployment, \
the most important risks, and concrete fixes for any compiler errors.";

/// 生成代码用的消息序列
pub fn generation_messages(parameters: &ArtifactParameters) -> Vec<Message> {
    vec![
        Message::system(GENERATION_SYSTEM),
        Message::user(describe(parameters)),
    ]
}

fn describe(parameters: &ArtifactParameters) -> String {
    match parameters {
        ArtifactParameters::Token(p) => {
            let mut text = format!(
                "Create a fungible asset token.\n- name: {}\n- symbol: {}\n- decimals: {}\n- total supply: {}\n",
                p.name, p.symbol, p.decimals, p.total_supply
            );
            if let Some(icon) = &p.icon_uri {
                text.push_str(&format!("- icon URI: {icon}\n"));
            }
            if let Some(project) = &p.project_uri {
                text.push_str(&format!("- project URI: {project}\n"));
            }
            text.push_str(
                "Include mint, burn and transfer entry functions restricted appropriately, \
                 and view functions for balance and supply.",
            );
            text
        }
        ArtifactParameters::Pool(p) => format!(
            "Create a constant-product liquidity pool.\n- name: {}\n- token A: {}\n- token B: {}\n\
             - swap fee: {}%\n- initial liquidity A: {}\n- initial liquidity B: {}\n\
             Include add_liquidity, remove_liquidity and swap entry functions, \
             LP share accounting, \
             and a view function for reserves.",
            p.name, p.token_a, p.token_b, p.fee, p.initial_liquidity_a, p.initial_liquidity_b
        ),
        ArtifactParameters::Vault(p) => format!(
            "Create a yield vault.\n- name: {}\n- deposit token: {}\n- strategy: {}\n\
             - performance fee: {}%\n- minimum deposit: {}\n\
             Include deposit and withdraw entry functions with share accounting, \
             a harvest function applying the fee, \
             and view functions for total assets and user shares.",
            p.name, p.token, p.strategy, p.fee, p.min_deposit
        ),
    }
}

/// 分析用的消息序列：类型 + 源码 + 编译结果
pub fn analysis_messages(
    artifact_type: ArtifactType,
    source: &str,
    outcome: &CompileOutcome,
) -> Vec<Message> {
    let verdict = if outcome.success {
        "succeeded".to_string()
    } else {
        format!("failed with exit code {}", outcome.exit_code)
    };
    let user = format!(
        "Artifact type: {artifact_type}\nCompilation {verdict}.\n\n\
         Compiler stdout:\n{}\n\nCompiler stderr:\n{}\n\nSource:\n```move\n{}\n```",
        truncate(&outcome.stdout, 4000),
        truncate(&outcome.stderr, 4000),
        source
    );
    vec![Message::system(ANALYSIS_SYSTEM), Message::user(user)]
}

/// 取出第一个 ``` 代码块的内容；没有代码块时原样返回（去掉首尾空白）
pub fn extract_code_block(raw: &str) -> String {
    let Some(open) = raw.find("```") else {
        return raw.trim().to_string();
    };
    let after_fence = &raw[open + 3..];
    // 跳过语言标记（如 move）所在的行
    let body_start = after_fence.find('\n').map(|i| i + 1).unwrap_or(after_fence.len());
    let body = &after_fence[body_start..];
    let body = match body.find("```") {
        Some(close) => &body[..close],
        None => body,
    };
    body.trim().to_string()
}

/// 部署费用的粗略标签（只是量级提示）
pub fn estimate_gas_label(artifact_type: ArtifactType) -> String {
    let label = match artifact_type {
        ArtifactType::Token => "~0.002 APT (estimated publish cost)",
        ArtifactType::Pool => "~0.005 APT (estimated publish cost)",
        ArtifactType::Vault => "~0.004 APT (estimated publish cost)",
    };
    label.to_string()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use crate::simulation::TokenParams;

    #[test]
    fn test_extract_fenced_move() {
        let raw = "Here you go:\n```move\nmodule simulation::demo {\n}\n```\nEnjoy.";
        assert_eq!(extract_code_block(raw), "module simulation::demo {\n}");
    }

    #[test]
    fn test_extract_without_fence() {
        assert_eq!(
            extract_code_block("  module simulation::demo {}\n"),
            "module simulation::demo {}"
        );
    }

    #[test]
    fn test_extract_unterminated_fence() {
        assert_eq!(extract_code_block("```\nmodule a::b {}"), "module a::b {}");
    }

    #[test]
    fn test_generation_prompt_carries_parameters() {
        let params = ArtifactParameters::Token(TokenParams {
            name: "Demo".into(),
            symbol: "DMO".into(),
            decimals: 8,
            total_supply: "1000000".into(),
            icon_uri: Some("https://example.com/dmo.png".into()),
            project_uri: None,
        });
        let messages = generation_messages(&params);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[1].content.contains("symbol: DMO"));
        assert!(messages[1].content.contains("dmo.png"));
        assert!(!messages[1].content.contains("project URI"));
    }

    #[test]
    fn test_analysis_prompt_mentions_failure() {
        let outcome = CompileOutcome {
            success: false,
            stdout: String::new(),
            stderr: "error: unbound module".into(),
            exit_code: 1,
            duration_ms: 10,
        };
        let messages = analysis_messages(ArtifactType::Pool, "module a::b {}", &outcome);
        assert!(messages[1].content.contains("failed with exit code 1"));
        assert!(messages[1].content.contains("unbound module"));
        assert!(messages[1].content.contains("Artifact type: pool"));
    }
}
