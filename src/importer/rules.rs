// ==========================================
// ERP 导入连接器 - 工艺路线业务规则
// ==========================================
// 优先级:
// 1. 无条件跳过模式 (结转/CAD-CAM 标记) → 跳过
// 2. 作废标记非空 → 跳过
// 3. 外协模式 → 外协工序 (工时 0, 人员 100%)
// 4. 其他 → 标准工序
// ==========================================

use crate::config::{config_keys, RoutingRuleSettings};
use crate::importer::error::{ImportError, ImportResult};
use regex::Regex;

/// 规则判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingClass {
    Skip { reason: String },
    Cooperation,
    Standard,
}

#[derive(Debug, Clone)]
pub struct RoutingRules {
    skip: Vec<Regex>,
    cooperation: Vec<Regex>,
}

impl RoutingRules {
    pub fn from_settings(settings: &RoutingRuleSettings) -> ImportResult<Self> {
        Ok(Self {
            skip: compile(config_keys::ROUTING_SKIP_PATTERNS, &settings.skip_patterns)?,
            cooperation: compile(
                config_keys::ROUTING_COOPERATION_PATTERNS,
                &settings.cooperation_patterns,
            )?,
        })
    }

    /// 按优先级判定一行工艺路线
    ///
    /// # 参数
    /// - codes: 参与模式匹配的代码 (工序类型, 工作中心代码)
    /// - obsolete: 作废标记是否非空
    pub fn classify(&self, codes: &[Option<&str>], obsolete: bool) -> RoutingClass {
        let codes: Vec<String> = codes
            .iter()
            .flatten()
            .map(|c| c.trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        if let Some((code, pattern)) = first_match(&self.skip, &codes) {
            return RoutingClass::Skip {
                reason: format!("代码 {} 匹配跳过规则 {}", code, pattern),
            };
        }
        if obsolete {
            return RoutingClass::Skip {
                reason: "工序已作废".to_string(),
            };
        }
        if first_match(&self.cooperation, &codes).is_some() {
            return RoutingClass::Cooperation;
        }
        RoutingClass::Standard
    }
}

fn compile(key: &str, patterns: &[String]) -> ImportResult<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| {
            Regex::new(p).map_err(|e| ImportError::ConfigValue {
                key: key.to_string(),
                value: p.clone(),
                message: e.to_string(),
            })
        })
        .collect()
}

fn first_match<'a>(patterns: &'a [Regex], codes: &'a [String]) -> Option<(&'a str, &'a str)> {
    codes.iter().find_map(|code| {
        patterns
            .iter()
            .find(|re| re.is_match(code))
            .map(|re| (code.as_str(), re.as_str()))
    })
}
