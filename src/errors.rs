use std::fmt;

#[derive(Debug, Clone)]
pub enum LinksightError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Config(String),
    Validation(String),
    NotFound(String),
    Serialization(String),
    AnalyticsInvalidDateRange(String),
    AnalyticsQueryFailed(String),
}

impl LinksightError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            LinksightError::DatabaseConfig(_) => "E001",
            LinksightError::DatabaseConnection(_) => "E002",
            LinksightError::DatabaseOperation(_) => "E003",
            LinksightError::Config(_) => "E004",
            LinksightError::Validation(_) => "E005",
            LinksightError::NotFound(_) => "E006",
            LinksightError::Serialization(_) => "E007",
            LinksightError::AnalyticsInvalidDateRange(_) => "E008",
            LinksightError::AnalyticsQueryFailed(_) => "E009",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            LinksightError::DatabaseConfig(_) => "Database Configuration Error",
            LinksightError::DatabaseConnection(_) => "Database Connection Error",
            LinksightError::DatabaseOperation(_) => "Database Operation Error",
            LinksightError::Config(_) => "Configuration Error",
            LinksightError::Validation(_) => "Validation Error",
            LinksightError::NotFound(_) => "Resource Not Found",
            LinksightError::Serialization(_) => "Serialization Error",
            LinksightError::AnalyticsInvalidDateRange(_) => "Invalid Analytics Date Range",
            LinksightError::AnalyticsQueryFailed(_) => "Analytics Query Failed",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            LinksightError::DatabaseConfig(msg) => msg,
            LinksightError::DatabaseConnection(msg) => msg,
            LinksightError::DatabaseOperation(msg) => msg,
            LinksightError::Config(msg) => msg,
            LinksightError::Validation(msg) => msg,
            LinksightError::NotFound(msg) => msg,
            LinksightError::Serialization(msg) => msg,
            LinksightError::AnalyticsInvalidDateRange(msg) => msg,
            LinksightError::AnalyticsQueryFailed(msg) => msg,
        }
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for LinksightError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for LinksightError {}

// 便捷的构造函数
impl LinksightError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        LinksightError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        LinksightError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        LinksightError::DatabaseOperation(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        LinksightError::Config(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        LinksightError::Validation(msg.into())
    }

    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        LinksightError::NotFound(msg.into())
    }

    pub fn serialization<T: Into<String>>(msg: T) -> Self {
        LinksightError::Serialization(msg.into())
    }

    pub fn analytics_invalid_date_range<T: Into<String>>(msg: T) -> Self {
        LinksightError::AnalyticsInvalidDateRange(msg.into())
    }

    pub fn analytics_query_failed<T: Into<String>>(msg: T) -> Self {
        LinksightError::AnalyticsQueryFailed(msg.into())
    }
}

// 为常见的错误类型实现 From trait
impl From<sea_orm::DbErr> for LinksightError {
    fn from(err: sea_orm::DbErr) -> Self {
        LinksightError::DatabaseOperation(err.to_string())
    }
}

impl From<serde_json::Error> for LinksightError {
    fn from(err: serde_json::Error) -> Self {
        LinksightError::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LinksightError>;
