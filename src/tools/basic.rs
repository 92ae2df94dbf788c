use crate::tools::parser::ToolArg;
use crate::tools::registry::Tool;
use crate::types::{AppError, Result};
use async_trait::async_trait;

pub struct CurrentDate;

#[async_trait]
impl Tool for CurrentDate {
    fn name(&self) -> &str {
        "get_current_date"
    }

    fn schema(&self) -> &str {
        "get_current_date() -> str: Returns the current date in YYYY-MM-DD format."
    }

    async fn call(&self, _args: &[ToolArg]) -> Result<String> {
        Ok(chrono::Local::now().format("%Y-%m-%d").to_string())
    }
}

pub struct SimpleInterest;

#[async_trait]
impl Tool for SimpleInterest {
    fn name(&self) -> &str {
        "calculate_simple_interest"
    }

    fn schema(&self) -> &str {
        "calculate_simple_interest(principal: float, rate: float, time: float) -> float: Calculates simple interest."
    }

    async fn call(&self, args: &[ToolArg]) -> Result<String> {
        let numbers: Vec<f64> = args.iter().filter_map(ToolArg::as_f64).collect();
        match numbers.as_slice() {
            [principal, rate, time] if numbers.len() == args.len() => {
                Ok(format!("{:?}", principal * rate * time))
            }
            _ => Err(AppError::Tool(format!(
                "expected 3 numeric arguments (principal, rate, time), got {}",
                args.iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_current_date_format() {
        let date = CurrentDate.call(&[]).await.unwrap();
        assert!(chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d").is_ok());
    }

    #[tokio::test]
    async fn test_simple_interest_rejects_text() {
        let args = [
            ToolArg::Number(1000.0),
            ToolArg::Text("five percent".to_string()),
            ToolArg::Number(2.0),
        ];
        let err = SimpleInterest.call(&args).await.unwrap_err();
        assert!(err.to_string().contains("five percent"));
    }

    #[tokio::test]
    async fn test_simple_interest_arity() {
        assert!(SimpleInterest.call(&[ToolArg::Number(1.0)]).await.is_err());
    }
}
