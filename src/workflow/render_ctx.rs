//! 渲染上下文
//!
//! 封装"我正在渲染哪个模式的哪道题"这一信息

use std::fmt::Display;

/// 单题渲染上下文
#[derive(Debug, Clone)]
pub struct RenderCtx {
    /// 模式ID
    pub pattern_id: u32,

    /// 题目实例ID
    pub instance_id: u32,

    /// 题目在模式中的位置（从0开始，决定结果的排列顺序）
    pub position: usize,
}

impl RenderCtx {
    pub fn new(pattern_id: u32, instance_id: u32, position: usize) -> Self {
        Self {
            pattern_id,
            instance_id,
            position,
        }
    }

    /// 图片文件名，例如 `pattern_03_question_02.png`
    ///
    /// 按题目位置编号：生成器给出重复的 instance_id 时图片也不会互相覆盖。
    pub fn image_file_name(&self) -> String {
        format!(
            "pattern_{:02}_question_{:02}.png",
            self.pattern_id, self.position
        )
    }
}

impl Display for RenderCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[模式 {} 题目 {}]", self.pattern_id, self.instance_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_and_file_name() {
        let ctx = RenderCtx::new(3, 7, 2);
        assert_eq!(ctx.to_string(), "[模式 3 题目 7]");
        assert_eq!(ctx.image_file_name(), "pattern_03_question_02.png");
    }

    #[test]
    fn test_file_name_distinct_for_repeated_instance_id() {
        let first = RenderCtx::new(1, 5, 0);
        let second = RenderCtx::new(1, 5, 1);
        assert_ne!(first.image_file_name(), second.image_file_name());
    }
}
