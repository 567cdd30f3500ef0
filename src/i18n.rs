/// Simple localization support for the launcher CLI.
/// Locale can be selected via the `--locale` flag (e.g. `--locale zh`).

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Zh,
}

impl Locale {
    pub fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "zh" | "zh-cn" | "zh_cn" | "zh-hans" | "zh-tw" | "zh_tw" => Self::Zh,
            _ => Self::En,
        }
    }
}

pub struct Messages {
    pub boot_started: &'static str,
    pub boot_completed: &'static str,
    pub boot_failed: &'static str,
    pub stage_hot_update: &'static str,
    pub stage_aot_metadata: &'static str,
    pub phase_loading: &'static str,
    pub phase_waiting_retry: &'static str,
    pub attempt_failed: &'static str,
    pub entry_point: &'static str,
    pub summary_header: &'static str,
    pub summary_modules: &'static str,
    pub summary_aot_blobs: &'static str,
    pub summary_entry_points: &'static str,
    pub error_prefix: &'static str,
    pub info_prefix: &'static str,
}

pub static EN: Messages = Messages {
    boot_started: "Boot started",
    boot_completed: "Boot completed",
    boot_failed: "Boot failed",
    stage_hot_update: "Loading hot-update modules",
    stage_aot_metadata: "Loading AOT metadata",
    phase_loading: "loading",
    phase_waiting_retry: "waiting to retry",
    attempt_failed: "attempt failed",
    entry_point: "entry point",
    summary_header: "Summary",
    summary_modules: "modules",
    summary_aot_blobs: "aot blobs",
    summary_entry_points: "entry points",
    error_prefix: "ERR",
    info_prefix: "INFO",
};

pub static ZH: Messages = Messages {
    boot_started: "启动开始",
    boot_completed: "启动完成",
    boot_failed: "启动失败",
    stage_hot_update: "正在加载热更新模块",
    stage_aot_metadata: "正在加载 AOT 元数据",
    phase_loading: "加载中",
    phase_waiting_retry: "等待重试",
    attempt_failed: "尝试失败",
    entry_point: "入口点",
    summary_header: "摘要",
    summary_modules: "模块",
    summary_aot_blobs: "AOT 数据",
    summary_entry_points: "入口点",
    error_prefix: "错误",
    info_prefix: "信息",
};

pub fn get_messages(locale: Locale) -> &'static Messages {
    match locale {
        Locale::En => &EN,
        Locale::Zh => &ZH,
    }
}
