use crate::level::LogLevel;

/// 将 (级别, 消息) 格式化为一行待写入的日志
///
/// 输出格式固定为 `"[LEVEL] message\n"`。纯函数，无失败路径；
/// 消息内容按字节透传，内嵌的换行符不做转义（与持久化格式约定一致）。
pub fn format_entry(level: LogLevel, message: &str) -> String {
    let name = level.name();
    // 预分配容量："[" + 级别名 + "] " + 消息 + "\n"
    let mut line = String::with_capacity(name.len() + message.len() + 4);
    line.push('[');
    line.push_str(name);
    line.push_str("] ");
    line.push_str(message);
    line.push('\n');
    line
}
