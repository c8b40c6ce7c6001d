//! tgfin-core: Core types and utilities for the chat finance tracker

pub mod group;
pub mod time;
pub mod transaction;

pub use group::{GroupId, GroupTypeMap};
pub use transaction::{
    Category, Transaction, TxType, DEFAULT_CURRENCY, DESCRIPTION_LIMIT, RAW_TEXT_LIMIT,
    UNKNOWN_GROUP_TITLE, truncate_chars,
};

/// Keyword categorizer for message text
pub mod categorizer {
    use super::Category;

    /// Keyword groups in priority order. First group with a hit wins.
    ///
    /// Stems rather than full words so that Russian inflections match
    /// ("продукты", "продуктов", "продуктами").
    pub const KEYWORD_TABLE: &[(Category, &[&str])] = &[
        (
            Category::Food,
            &[
                "продукт", "еда", "еду", "кафе", "ресторан", "обед", "ужин", "завтрак",
                "кофе", "пицц", "супермаркет", "пятерочк", "перекрест", "доставк",
                "grocery", "food", "restaurant", "cafe", "lunch", "dinner",
            ],
        ),
        (
            Category::Transport,
            &[
                "такси", "метро", "автобус", "бензин", "топливо", "транспорт", "проезд",
                "парковк", "электричк", "билет на поезд", "taxi", "uber", "fuel", "metro",
            ],
        ),
        (
            Category::Utilities,
            &[
                "коммунал", "жкх", "квартплат", "электроэнерг", "электричеств", "интернет",
                "связь", "мобильн", "аренд", "utilities", "electricity", "internet", "rent",
            ],
        ),
        (
            Category::Entertainment,
            &[
                "кино", "концерт", "театр", "развлеч", "подписк", "игр", "музей",
                "netflix", "spotify", "cinema", "games",
            ],
        ),
        (
            Category::Health,
            &[
                "аптек", "лекарств", "врач", "больниц", "стоматолог", "клиник", "анализ",
                "здоров", "pharmacy", "doctor", "medicine",
            ],
        ),
        (
            Category::Clothing,
            &["одежд", "обувь", "куртк", "джинс", "кроссовк", "clothes", "shoes"],
        ),
        (
            Category::Education,
            &[
                "курс", "обучени", "учеб", "книг", "школ", "универ", "репетитор",
                "tuition", "course", "book",
            ],
        ),
        (
            Category::Work,
            &[
                "зарплат", "аванс", "преми", "гонорар", "фриланс", "заказчик", "работ",
                "salary", "payroll", "freelance", "bonus",
            ],
        ),
    ];

    /// Categorize message text by case-insensitive keyword containment.
    pub fn categorize(text: &str) -> Category {
        let text = text.to_lowercase();
        KEYWORD_TABLE
            .iter()
            .find(|(_, keywords)| keywords.iter().any(|k| text.contains(k)))
            .map(|(category, _)| *category)
            .unwrap_or(Category::Other)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_categorize_groceries() {
            assert_eq!(categorize("Купил продукты на 1500 руб"), Category::Food);
        }

        #[test]
        fn test_categorize_salary() {
            assert_eq!(categorize("Получил зарплату 50000 руб"), Category::Work);
        }

        #[test]
        fn test_categorize_internet_bill() {
            assert_eq!(categorize("Оплата интернета 700 руб"), Category::Utilities);
        }

        #[test]
        fn test_categorize_is_case_insensitive() {
            assert_eq!(categorize("ТАКСИ до дома 450"), Category::Transport);
            assert_eq!(categorize("Netflix 799"), Category::Entertainment);
        }

        #[test]
        fn test_categorize_defaults_to_other() {
            assert_eq!(categorize("Перевод от друга 10000 руб"), Category::Other);
            assert_eq!(categorize(""), Category::Other);
        }

        #[test]
        fn test_first_group_wins() {
            // food precedes work in the table
            assert_eq!(categorize("обед на работе 600"), Category::Food);
        }

        #[test]
        fn test_keywords_are_lowercase() {
            for (_, keywords) in KEYWORD_TABLE {
                for k in *keywords {
                    assert_eq!(*k, k.to_lowercase(), "keyword {k} must be lowercase");
                }
            }
        }
    }
}

pub use categorizer::categorize;
