//! Analysis instruction template sent alongside the uploaded document.

/// Build the extraction prompt for the requested analysis type.
pub fn analysis_prompt(analysis_type: &str) -> String {
    format!(
        r#"You are a professional financial analyst with expertise in bank statement analysis.
Perform a {analysis_type} analysis of the uploaded bank statement and report:

1. DOCUMENT STRUCTURE: bank name, account type, statement period (start and
   end dates), masked account number, opening and closing balances.
2. TRANSACTION CATEGORIZATION: group transactions into logical categories
   (Food & Dining, Transportation, Shopping, Bills & Utilities, Entertainment,
   Healthcare, Income, ...) with totals, counts, percentages, and whether each
   category is recurring.
3. SPENDING PATTERNS: recurring transactions and their frequency, seasonal
   patterns, average amounts per category, largest expense trends.
4. INCOME ANALYSIS: all income sources, primary vs secondary income,
   stability and frequency patterns, diversification.
5. CASH FLOW: net cash flow for the period, balance fluctuations, peak
   spending and income periods.
6. ANOMALY DETECTION: unusually large transactions, duplicates, spending
   spikes, potential fraud indicators.
7. FINANCIAL HEALTH: savings rate, expense-to-income ratio, stability
   indicators, overall health score on a 0-100 scale.
8. INSIGHTS & RECOMMENDATIONS: overspending areas, budget optimizations,
   savings opportunities, positive behaviors.
9. RISK ASSESSMENT: overall risk level, risk factors, overdraft or low
   balance patterns.

IMPORTANT:
- Base the analysis ONLY on data actually visible in the document.
- If information cannot be determined, use null; never invent values.
- Mask account numbers to the last four digits.
- Use exact merchant names and precise dates as they appear.

Respond with a single valid JSON object, no surrounding prose, matching:
{{
  "document_info": {{
    "bank_name": "string or null",
    "account_type": "string or null",
    "account_number_masked": "string or null",
    "statement_period_start": "YYYY-MM-DD or null",
    "statement_period_end": "YYYY-MM-DD or null",
    "opening_balance": number or null,
    "closing_balance": number or null
  }},
  "summary": {{
    "total_income": number,
    "total_expenses": number,
    "net_cash_flow": number,
    "transaction_count": integer,
    "financial_health_score": number (0-100)
  }},
  "transaction_categories": [
    {{"category": "string", "amount": number, "count": integer,
      "percentage": number, "avg_transaction_amount": number,
      "largest_transaction": number, "is_recurring": boolean}}
  ],
  "spending_patterns": [
    {{"pattern_type": "string", "description": "string", "frequency": "string",
      "average_amount": number, "confidence_score": number (0-1),
      "examples": ["string"]}}
  ],
  "income_analysis": {{
    "primary_income": number, "secondary_income": number,
    "income_frequency": "string", "income_stability": "string",
    "income_sources": [{{"source": "string", "amount": number, "frequency": "string"}}]
  }},
  "cash_flow_analysis": {{
    "average_daily_balance": number, "lowest_balance": number,
    "highest_balance": number, "balance_volatility": "low|medium|high",
    "cash_flow_trend": "improving|stable|declining"
  }},
  "anomalies": [
    {{"transaction_date": "YYYY-MM-DD", "description": "string", "amount": number,
      "severity": "low|medium|high", "category": "string", "reason": "string",
      "confidence_score": number (0-1)}}
  ],
  "insights": [
    {{"type": "spending|income|savings|cash_flow|general", "title": "string",
      "description": "string", "impact": "positive|negative|neutral",
      "priority": "low|medium|high", "actionable": boolean,
      "supporting_data": "string"}}
  ],
  "recommendations": [
    {{"category": "budgeting|savings|spending|income|general", "title": "string",
      "description": "string", "potential_savings": number or null,
      "difficulty": "easy|medium|hard", "timeframe": "immediate|short_term|long_term",
      "priority": "low|medium|high"}}
  ],
  "risk_assessment": {{
    "overall_risk": "low|medium|high", "risk_factors": ["string"],
    "risk_score": number (0-100), "financial_stability": "stable|moderate|unstable",
    "recommendations": ["string"]
  }},
  "detailed_analysis": "string (comprehensive written analysis of 200-500 words)"
}}"#
    )
}
